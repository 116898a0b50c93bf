pub mod sync;

pub use sync::{
    ConfirmationGate, HistorySync, RemoveOutcome, DELETE_CONFIRM_PROMPT, DELETE_FAILED_MESSAGE,
    EMPTY_HISTORY_NOTICE, HISTORY_LOAD_FAILED_MESSAGE,
};
