pub mod format;
pub mod storage;
pub mod types;

pub use format::{format_answer, render_ansi, render_html, Segment};
pub use storage::Transcript;
pub use types::{AudioClip, ChatMessage, Exchange, ExchangeId, ExchangeState, Sender};
