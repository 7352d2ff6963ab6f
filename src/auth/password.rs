use bcrypt::{BcryptError, Version};
use tracing::{error, warn};

pub const HASH_COST: u32 = 8;

/// `$2a$` keeps new digests in the format existing records use.
pub fn hash_password(plain: &str) -> Result<String, BcryptError> {
    let salt: [u8; 16] = rand::random();
    let parts = bcrypt::hash_with_salt(plain, HASH_COST, salt).map_err(|e| {
        error!(error = %e, "bcrypt hash_password error");
        e
    })?;
    Ok(parts.format_for_version(Version::TwoA))
}

pub fn verify_password(plain: &str, digest: &str) -> bool {
    match bcrypt::verify(plain, digest) {
        Ok(matches) => matches,
        Err(e) => {
            warn!(error = %e, "stored password digest is malformed");
            false
        }
    }
}
