//! Host discovery -- sockets and processes via `/proc`, containers via Docker.

pub mod containers;
pub mod processes;
pub mod sockets;

pub use containers::DockerContainerProvider;
pub use processes::ProcfsProcessProvider;
pub use sockets::ProcfsSocketProvider;
