//! Filesystem isolation for worker processes.
//!
//! ## Overview
//!
//! A worker with `writable_root = false` must see a read-only root filesystem
//! except for its configured volumes.
//! - On **Linux** with [`IsolationMode::Namespace`] the child enters a private
//!   mount namespace inside a `pre_exec` hook, after `fork()` and before
//!   `execve()`: mounts are made private, every volume is bind-mounted onto
//!   itself, and `/` is remounted read-only. Volume mounts are separate mounts,
//!   so they stay writable.
//! - Everywhere else the plan is not enforced; a warning is logged and the
//!   worker runs against the host filesystem.
//!
//! Creating a mount namespace needs `CAP_SYS_ADMIN`; [`IsolationMode::detect`]
//! only picks `Namespace` when running as root.

use std::{ffi::CString, path::Path};

use tokio::process::Command;
use tracing::warn;
use watchbot_core::{LaunchError, LaunchSpec};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IsolationMode {
    /// Workers share the host mount table.
    #[default]
    None,
    /// Workers get a private mount namespace.
    Namespace,
}

impl IsolationMode {
    pub fn detect() -> Self {
        #[cfg(target_os = "linux")]
        {
            if unsafe { libc::geteuid() } == 0 {
                return IsolationMode::Namespace;
            }
        }
        IsolationMode::None
    }
}

/// Mounts to set up for one worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountPlan {
    volumes: Vec<CString>,
}

impl MountPlan {
    /// `None` when the worker needs no isolation (`writable_root`).
    pub fn for_spec(spec: &LaunchSpec) -> Result<Option<Self>, LaunchError> {
        if spec.writable_root {
            return Ok(None);
        }
        let volumes = spec
            .volumes
            .iter()
            .map(|v| {
                CString::new(v.as_str())
                    .map_err(|_| LaunchError::Spawn(format!("volume {v:?} contains a NUL byte")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Self { volumes }))
    }

    pub fn volumes(&self) -> &[CString] {
        &self.volumes
    }
}

/// Every volume must exist on the host before the worker starts.
pub fn check_volumes(volumes: &[String]) -> Result<(), LaunchError> {
    match volumes.iter().find(|v| !Path::new(v).exists()) {
        Some(missing) => Err(LaunchError::Spawn(format!("volume {missing} does not exist"))),
        None => Ok(()),
    }
}

/// Installs `plan` on `cmd` according to `mode`.
pub fn attach(cmd: &mut Command, plan: MountPlan, mode: IsolationMode) {
    match mode {
        IsolationMode::None => {
            warn!(
                target: "watchbot.exec.sandbox",
                "read-only root requested but isolation is disabled; worker sees the host filesystem"
            );
        }
        IsolationMode::Namespace => {
            #[cfg(target_os = "linux")]
            {
                linux::attach(cmd, plan);
            }
            #[cfg(not(target_os = "linux"))]
            {
                let _ = (cmd, plan);
                warn!(
                    target: "watchbot.exec.sandbox",
                    "mount namespaces are Linux-only; isolation ignored"
                );
            }
        }
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::{io, ptr};

    use tokio::process::Command;

    use super::MountPlan;

    pub fn attach(cmd: &mut Command, plan: MountPlan) {
        // The hook runs between fork and exec: libc calls only, no allocation.
        unsafe {
            cmd.pre_exec(move || enter(&plan));
        }
    }

    fn enter(plan: &MountPlan) -> io::Result<()> {
        let root = c"/";
        check(unsafe { libc::unshare(libc::CLONE_NEWNS) })?;
        check(unsafe {
            libc::mount(
                ptr::null(),
                root.as_ptr(),
                ptr::null(),
                libc::MS_REC | libc::MS_PRIVATE,
                ptr::null(),
            )
        })?;
        for volume in plan.volumes() {
            check(unsafe {
                libc::mount(
                    volume.as_ptr(),
                    volume.as_ptr(),
                    ptr::null(),
                    libc::MS_BIND | libc::MS_REC,
                    ptr::null(),
                )
            })?;
        }
        check(unsafe {
            libc::mount(
                ptr::null(),
                root.as_ptr(),
                ptr::null(),
                libc::MS_REMOUNT | libc::MS_BIND | libc::MS_RDONLY,
                ptr::null(),
            )
        })
    }

    fn check(rc: libc::c_int) -> io::Result<()> {
        if rc != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}
