use rand::Rng;
use rand::rngs::ThreadRng;

const NAME_LENGTH: usize = 24;
const USER_LENGTH: usize = 16;
const PASSWORD_LENGTH: usize = 32;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const PASSWORD_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz\
ABCDEFGHIJKLMNOPQRSTUVWXYZ\
0123456789\
!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// A freshly generated name/user/password triple for a tenant database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub name: String,
    pub user: String,
    pub password: String,
}

/// Generates database credentials from a CSPRNG.
///
/// Names and users are lowercase because both engines fold unquoted
/// identifiers; uniqueness against existing tenants is the caller's job.
#[derive(Debug, Default, Clone, Copy)]
pub struct CredentialGenerator;

impl CredentialGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn generate(&self) -> Credentials {
        let mut rng = rand::thread_rng();
        Credentials {
            name: random_string(&mut rng, LOWERCASE, NAME_LENGTH),
            user: random_string(&mut rng, LOWERCASE, USER_LENGTH),
            password: random_string(&mut rng, PASSWORD_CHARS, PASSWORD_LENGTH),
        }
    }

    /// Generates only a password, for explicit password resets.
    #[must_use]
    pub fn generate_password(&self) -> String {
        random_string(&mut rand::thread_rng(), PASSWORD_CHARS, PASSWORD_LENGTH)
    }
}

fn random_string(rng: &mut ThreadRng, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}
