//! SSH key material and the guest customization script.
//!
//! The key pair is created with the system `ssh-keygen` next to the machine
//! record. The public half is injected into the guest by a boot-time script
//! that vCloud runs in its `postcustomization` phase.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::info;

use crate::error::{Error, Result};
use crate::vcd::types::GuestCustomizationSection;

/// `<private key path>.pub`
pub fn public_key_path(private_key: &Path) -> PathBuf {
    let mut path = OsString::from(private_key.as_os_str());
    path.push(".pub");
    PathBuf::from(path)
}

/// Return the public key for `private_key`, generating the pair first when
/// no private key exists yet.
pub async fn ensure_ssh_key(private_key: &Path) -> Result<String> {
    if !private_key.exists() {
        generate_key_pair(private_key).await?;
    }

    let public = public_key_path(private_key);
    let key = tokio::fs::read_to_string(&public)
        .await
        .map_err(|e| Error::KeyGeneration(format!("reading {}: {e}", public.display())))?;
    let key = key.trim().to_string();
    check_public_key(&key)?;
    Ok(key)
}

/// RSA 2048 key pair with an empty passphrase.
async fn generate_key_pair(private_key: &Path) -> Result<()> {
    if let Some(dir) = private_key.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::store(dir, e))?;
    }

    info!(path = %private_key.display(), "Generating SSH key pair");
    let status = Command::new("ssh-keygen")
        .args(["-q", "-t", "rsa", "-b", "2048", "-N", "", "-C", ""])
        .arg("-f")
        .arg(private_key)
        .status()
        .await
        .map_err(|e| Error::KeyGeneration(format!("failed to spawn `ssh-keygen`: {e}")))?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::KeyGeneration(format!(
            "`ssh-keygen` exited with {}",
            status.code().unwrap_or(-1)
        )))
    }
}

/// A key is embedded in single quotes inside the script, so it must be one
/// line without quotes.
fn check_public_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::KeyGeneration("public key is empty".into()));
    }
    if key.contains(['\'', '\n', '\r']) {
        return Err(Error::KeyGeneration(
            "public key must be a single line without quotes".into(),
        ));
    }
    Ok(())
}

/// Bash script that appends `public_key` to root's authorized keys during
/// postcustomization and does nothing in the precustomization phase.
pub fn customization_script(public_key: &str) -> String {
    format!(
        r#"#!/bin/bash
if [ x$1 == x"precustomization" ]; then
    echo 'precustomization: nothing to do'
elif [ x$1 == x"postcustomization" ]; then
    mkdir -p /root/.ssh
    echo '{key}' >> /root/.ssh/authorized_keys
    chmod -R go-rwx /root/.ssh
fi
"#,
        key = public_key.trim()
    )
}

/// Enable customization with `script`, keeping the rest of `existing`.
pub fn guest_section(
    existing: GuestCustomizationSection,
    script: String,
) -> GuestCustomizationSection {
    GuestCustomizationSection {
        enabled: Some(true),
        customization_script: Some(script),
        ..existing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQC7 docker@host";

    #[test]
    fn public_key_path_appends_suffix() {
        assert_eq!(
            public_key_path(Path::new("/store/machines/web/id_rsa")),
            PathBuf::from("/store/machines/web/id_rsa.pub")
        );
    }

    #[test]
    fn script_appends_key_in_postcustomization_only() {
        let script = customization_script(&format!("  {KEY}\n"));
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains(&format!("echo '{KEY}' >> /root/.ssh/authorized_keys")));
        let post = script.find("postcustomization").unwrap();
        let append = script.find(">> /root/.ssh/authorized_keys").unwrap();
        assert!(append > post);
        assert!(script.contains("chmod -R go-rwx /root/.ssh"));
    }

    #[test]
    fn guest_section_enables_and_keeps_other_fields() {
        let existing = GuestCustomizationSection {
            enabled: Some(false),
            computer_name: Some("web".into()),
            ..Default::default()
        };
        let section = guest_section(existing, "script".into());
        assert_eq!(section.enabled, Some(true));
        assert_eq!(section.customization_script.as_deref(), Some("script"));
        assert_eq!(section.computer_name.as_deref(), Some("web"));
    }

    #[test]
    fn quoted_or_multiline_keys_are_rejected() {
        assert!(check_public_key(KEY).is_ok());
        assert!(check_public_key("").is_err());
        assert!(check_public_key("ssh-rsa AAA'; rm -rf /").is_err());
        assert!(check_public_key("ssh-rsa AAA\nssh-rsa BBB").is_err());
    }

    #[tokio::test]
    async fn existing_key_pair_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("id_rsa");
        std::fs::write(&private, "PRIVATE").unwrap();
        std::fs::write(public_key_path(&private), format!("{KEY}\n")).unwrap();

        let key = ensure_ssh_key(&private).await.unwrap();
        assert_eq!(key, KEY);
        assert_eq!(std::fs::read_to_string(&private).unwrap(), "PRIVATE");
    }
}
