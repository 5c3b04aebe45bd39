pub mod budget;
pub mod completion;
pub mod config;
pub mod summarize;
pub mod tokenizer;
