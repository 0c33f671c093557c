//! Plan mutation handling: validate, persist, then fan out.

mod router;

pub use router::PlanRouter;
