pub mod time;

use nanoid::nanoid;

const ID_LEN: usize = 21;

/// Generate a url-safe random identifier.
pub fn longid() -> String {
    nanoid!(ID_LEN)
}
