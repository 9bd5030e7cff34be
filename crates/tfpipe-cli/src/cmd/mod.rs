pub mod analyze;
pub mod apply;
pub mod backend;
pub mod backup;
pub mod init;
pub mod lock;
pub mod pipeline;
pub mod plan;
pub mod run;
pub mod scan;
pub mod secrets;
