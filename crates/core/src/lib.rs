// Sequential step runner: each step's results feed the next, with external cancellation

pub mod callback;
pub mod defer;
pub mod error;
pub mod sequencer;
pub mod step;
pub mod terminator;
pub mod types;

mod abort;
mod state;

pub use callback::AsyncCallback;
pub use defer::defer;
pub use error::WaterfallError;
pub use sequencer::{waterfall, waterfall_async, Done, RunHandle};
pub use step::{future_step, step, Canceller, Step};
pub use terminator::Terminator;
pub use types::*;
