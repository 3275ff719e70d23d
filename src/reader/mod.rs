mod queue;

pub use queue::ReadOrder;
pub(crate) use queue::{Predicate, PushOutcome, ReadState};
