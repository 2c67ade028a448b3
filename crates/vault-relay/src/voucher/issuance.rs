use super::records::IssuedCode;
use crate::store::{keys, Guard, Op, StateStore, Txn};
use rand::Rng;
use tracing::{info, warn};
use vault_types::{CodeClass, CodeHash, EthAddress, VaultError, VaultResult};

const MAX_BATCH: usize = 10_000;
const MAX_COLLISIONS: usize = 16;

/// Printed form `WV-XXXX-XXXX` with four uppercase hex digits per group.
pub fn generate_raw_code<R: Rng>(rng: &mut R) -> String {
    let a: u16 = rng.gen();
    let b: u16 = rng.gen();
    format!("WV-{:04X}-{:04X}", a, b)
}

fn class_key(class: CodeClass) -> &'static str {
    match class {
        CodeClass::Reader => keys::VALID_CODES,
        CodeClass::Author => keys::AUTHOR_CODES,
        CodeClass::Publisher => keys::PUBLISHER_CODES,
    }
}

/// Issues `count` fresh codes of `class`. A hash already known in any code
/// set is regenerated, so an issued code never aliases an existing one.
pub async fn issue_codes(
    store: &dyn StateStore,
    count: usize,
    class: CodeClass,
    book: Option<EthAddress>,
) -> VaultResult<Vec<IssuedCode>> {
    if count == 0 || count > MAX_BATCH {
        return Err(VaultError::InvalidInput(format!(
            "Batch size must be between 1 and {}",
            MAX_BATCH
        )));
    }

    let mut issued = Vec::with_capacity(count);
    let mut collisions = 0usize;

    while issued.len() < count {
        let raw = generate_raw_code(&mut rand::thread_rng());
        let hash = CodeHash::of_raw(&raw);
        let member = hash.to_hex();

        let mut txn = Txn::new()
            .guard(Guard::not_member(keys::VALID_CODES, &member))
            .guard(Guard::not_member(keys::USED_CODES, &member))
            .guard(Guard::not_member(keys::AUTHOR_CODES, &member))
            .guard(Guard::not_member(keys::PUBLISHER_CODES, &member))
            .op(Op::sadd(class_key(class), &member));
        if let Some(book) = book {
            txn.push(Op::hset(keys::CODE_BOOKS, &member, book.to_hex()));
        }

        if store.commit(txn).await?.is_committed() {
            issued.push(IssuedCode { raw, hash });
        } else {
            collisions += 1;
            if collisions > MAX_COLLISIONS {
                return Err(VaultError::Internal(format!(
                    "Too many code collisions after issuing {}",
                    issued.len()
                )));
            }
            warn!("Generated code collided with an existing one, regenerating");
        }
    }

    info!("Issued {} {} codes", issued.len(), class);
    Ok(issued)
}
