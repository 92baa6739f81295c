mod util;
pub use util::{DEFAULT_KILL_GRACE, kill_graceful};

pub mod sandbox;
pub use sandbox::{IsolationMode, MountPlan};

pub mod proc;
pub use proc::{LocalLauncher, LocalProcess};
