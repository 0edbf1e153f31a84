//! Privilege check run by the server binary before it opens the catalog
//! database.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Refuses to serve as root unless `allow_root` is set. A root server would
/// leave root-owned WAL and database files the service account cannot write.
pub fn check_privileges(allow_root: bool) -> Result<()> {
    check_uid(Uid::effective(), allow_root)
}

fn check_uid(uid: Uid, allow_root: bool) -> Result<()> {
    if !uid.is_root() {
        tracing::debug!(uid = uid.as_raw(), "serving unprivileged");
        return Ok(());
    }
    if allow_root {
        tracing::warn!("serving as root; new catalog files will be owned by root");
        return Ok(());
    }
    bail!("videocat backend must not run as root; use a service account or pass --allow-root")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_needs_explicit_override() {
        assert!(check_uid(Uid::from_raw(0), false).is_err());
        assert!(check_uid(Uid::from_raw(0), true).is_ok());
        assert!(check_uid(Uid::from_raw(1000), false).is_ok());
    }
}
