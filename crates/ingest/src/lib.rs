pub mod input;
pub mod reader;

pub use input::{InputSource, InputText, PromptError, DEFAULT_MAX_CHARS};
pub use reader::FileReader;
