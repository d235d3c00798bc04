// Pipeline orchestration.

pub mod run;
