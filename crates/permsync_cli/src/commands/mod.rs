pub(crate) mod jobs;
pub(crate) mod meta;
pub(crate) mod migrate;
pub(crate) mod perms;
pub(crate) mod schedule;
pub(crate) mod shared;
