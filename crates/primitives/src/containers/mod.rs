//! Reader/writer locked collections shared between the challenge tree, edge trackers and the
//! confirmation job. Cloning any of these yields another handle to the same underlying data.

mod map;
pub use map::ThreadSafeMap;

mod slice;
pub use slice::ThreadSafeSlice;

mod set;
pub use set::ThreadSafeSet;
