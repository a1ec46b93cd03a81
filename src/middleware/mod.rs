pub mod session_extractor;
