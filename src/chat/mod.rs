pub mod controller;
pub mod progress;

pub use controller::{
    ChatEvent, ExchangeController, SubmitOutcome, EMPTY_ANSWER_MESSAGE, GENERIC_FAILURE_MESSAGE,
    SESSION_EXPIRED_MESSAGE,
};
pub use progress::{ProgressNotifier, StagePlan, StageReveal};

/// Starter prompts offered on an empty conversation
pub const SUGGESTED_QUESTIONS: [&str; 3] = [
    "What are the three doshas?",
    "Herbs for digestion",
    "Daily Ayurvedic routine",
];

/// Topic prompts for browsing
pub const EXPLORE_TOPICS: [(&str, &str); 5] = [
    ("The Three Doshas", "What are the three doshas in Ayurveda?"),
    ("Understanding Prakriti", "What is Prakriti in Ayurveda?"),
    ("Ayurvedic Diet", "What are the principles of Ayurvedic diet?"),
    ("Medicinal Herbs", "What are common Ayurvedic herbs and their benefits?"),
    ("Daily Routine (Dinacharya)", "What is dinacharya in Ayurveda?"),
];
