pub mod acos; // ACOS review pipeline
