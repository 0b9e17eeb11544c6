//! Weekly scheduling engine: time helpers, overlap checks, the lesson
//! repository and week lifecycle.

pub mod conflict;
pub mod lessons;
pub mod time;
pub mod weeks;
