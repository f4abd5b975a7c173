use cuid2::CuidConstructor;
use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, Rng};

static CUID: Lazy<CuidConstructor> = Lazy::new(CuidConstructor::new);

const INVITE_CODE_LEN: usize = 8;

pub fn new_id() -> String {
    CUID.create_id()
}

/// Eight upper-case alphanumerics.
pub fn new_invite_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INVITE_CODE_LEN)
        .map(|byte| char::from(byte).to_ascii_uppercase())
        .collect()
}
