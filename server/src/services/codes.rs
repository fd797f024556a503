use rand::Rng;
use tracing::warn;

use crate::store::Store;
use crate::utils::error::AppError;

pub const CODE_LENGTH: usize = 8;
pub const MAX_CODE_ATTEMPTS: usize = 5;

/// No 0/O or 1/I, the code is read out loud at pickup.
const ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Draws codes until one is unused, giving up after [`MAX_CODE_ATTEMPTS`].
pub async fn generate_unique_code<F>(store: &dyn Store, mut generate: F) -> Result<String, AppError>
where
    F: FnMut() -> String + Send,
{
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = generate();
        if !store.code_exists(&code).await? {
            return Ok(code);
        }
        warn!(attempt, "Ticket code collision");
    }
    Err(AppError::InternalServerError(
        "Es konnte kein eindeutiger Ticketcode erzeugt werden. Bitte später erneut versuchen."
            .to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewSoldTicket;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    async fn store_with_code(code: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_sold_ticket(NewSoldTicket {
                buyer_id: Uuid::new_v4(),
                reserve_id: Uuid::new_v4(),
                quantity: 1,
                delivery_method: "Abholung".into(),
                code: code.into(),
                price_paid: Decimal::ZERO,
            })
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_generated_code_shape() {
        let code = generate_code();
        assert_eq!(code.len(), CODE_LENGTH);
        assert!(code.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[tokio::test]
    async fn test_retries_past_collisions() {
        let store = store_with_code("TAKEN234").await;
        let mut candidates = vec!["FREE5678", "TAKEN234", "TAKEN234"];
        let code = generate_unique_code(&store, || candidates.pop().unwrap().to_string())
            .await
            .unwrap();
        assert_eq!(code, "FREE5678");
    }

    #[tokio::test]
    async fn test_gives_up_after_five_attempts() {
        let store = store_with_code("TAKEN234").await;
        let mut calls = 0;
        let result = generate_unique_code(&store, || {
            calls += 1;
            "TAKEN234".to_string()
        })
        .await;
        assert!(matches!(result, Err(AppError::InternalServerError(_))));
        assert_eq!(calls, MAX_CODE_ATTEMPTS);
    }
}
