//! Key-generation utility.
//!
//! Provisions the RSA keypair used to give a worker an SSH/TLS identity.
//! Listed by spec 1 as deliberately out of scope for the orchestration
//! plane and never invoked by the Worker-Builder or Task Executor; exposed
//! only as a library function and a `--generate-keys` subcommand on the
//! orchestrator binary.

use std::path::Path;

use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::CryptoError;

pub struct KeyPair {
    pub private_key_pem: String,
    pub public_key_pem: String,
}

/// Generate an RSA keypair of the given modulus size (2048 or 4096 are the
/// sane choices; smaller values exist only for tests).
pub fn generate_keypair(bits: usize) -> Result<KeyPair, CryptoError> {
    let mut rng = rand::thread_rng();
    let private_key =
        RsaPrivateKey::new(&mut rng, bits).map_err(|e| CryptoError::KeyGen(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_key_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| CryptoError::KeyGen(e.to_string()))?
        .to_string();
    let public_key_pem = public_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| CryptoError::KeyGen(e.to_string()))?;

    Ok(KeyPair {
        private_key_pem,
        public_key_pem,
    })
}

/// Generate a keypair and write it as `<dir>/id_rsa` + `<dir>/id_rsa.pub`.
pub fn generate_keypair_to_dir(dir: &Path, bits: usize) -> Result<(), CryptoError> {
    let pair = generate_keypair(bits)?;
    let private_path = dir.join("id_rsa");
    let public_path = dir.join("id_rsa.pub");

    std::fs::write(&private_path, &pair.private_key_pem).map_err(|e| CryptoError::Write {
        path: private_path.clone(),
        cause: e.to_string(),
    })?;
    std::fs::write(&public_path, &pair.public_key_pem).map_err(|e| CryptoError::Write {
        path: public_path.clone(),
        cause: e.to_string(),
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&private_path, std::fs::Permissions::from_mode(0o600)).map_err(
            |e| CryptoError::Write {
                path: private_path,
                cause: e.to_string(),
            },
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_distinct_keypairs() {
        let a = generate_keypair(512).unwrap();
        let b = generate_keypair(512).unwrap();
        assert_ne!(a.private_key_pem, b.private_key_pem);
        assert!(a.private_key_pem.contains("BEGIN RSA PRIVATE KEY"));
        assert!(a.public_key_pem.contains("BEGIN RSA PUBLIC KEY"));
    }

    #[test]
    fn writes_keypair_files_with_restricted_permissions() {
        let dir = tempfile::tempdir().unwrap();
        generate_keypair_to_dir(dir.path(), 512).unwrap();
        assert!(dir.path().join("id_rsa").is_file());
        assert!(dir.path().join("id_rsa.pub").is_file());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path().join("id_rsa"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
