pub mod classifier_gate;
pub mod classify;
pub mod grouper;
pub mod ingest;
pub mod processor;
pub mod recommend;
