// Core modules implementing the value model, wire marshalling, and errors.
pub mod attachment;
pub mod error;
pub mod latin9;
pub mod marshal;
pub mod protocol;
pub mod value;
pub mod widgets;
