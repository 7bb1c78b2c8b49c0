pub mod config;
pub mod crawler;
pub mod epub;
pub mod error;
pub mod models;
pub mod progress;
pub mod utils;

pub use config::Settings;
pub use crawler::{LibMeParser, NovelParser, find_parser};
pub use epub::{Assembler, AssemblyReport};
pub use error::{Error, ErrorKind, Result};
pub use models::{Chapter, ChapterKey, Chapters, Novel};
pub use progress::{NoopReporter, ProgressReporter, TracingReporter};
pub use utils::{ChapterSelection, get_user_input};
