mod cancel;
mod clock;

pub use {
    cancel::CancellationToken,
    clock::{Clock, ManualClock, SystemClock},
};
