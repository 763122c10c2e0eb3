//! Job frames, the continuation protocol, and the batch-join surface.

mod header;
mod join;
mod list;
mod raw;
mod state;
mod tracking;

pub use join::{spawn, spawn_main, JobHandle};
pub use list::JobList;

pub(crate) use header::JobOpts;
pub(crate) use raw::{new_job, Job, JobCore, ResultSlot};
pub(crate) use state::{ScheduleAction, SuspendAction};
pub(crate) use tracking::TrackingBlock;
