mod sema;

pub(crate) use sema::Semaphore;
