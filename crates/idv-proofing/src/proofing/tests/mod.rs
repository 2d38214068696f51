mod common;
mod queue;
mod routing;
