pub mod assignment;
pub mod dispatch;
pub mod queue;
pub mod transitions;
