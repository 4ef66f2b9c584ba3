use std::sync::Arc;

use boxoffice_shared::{redact_email, User, UserId};
use tracing::{info, instrument};

use crate::repository::{StoreTransaction, TransactionalStore};
use crate::unit_of_work::{Transaction, TxScope};
use crate::{CoreError, CoreResult};

const MAX_FIELD_LEN: usize = 100;

/// User registration and lookup
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn TransactionalStore>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn TransactionalStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, outer, email))]
    pub async fn register_user(
        &self,
        outer: Option<&mut Transaction>,
        username: &str,
        email: &str,
    ) -> CoreResult<User> {
        let user = User::new(username.trim().to_string(), email.trim().to_string());
        validate_user(&user)?;

        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let outcome = scope.tx().insert_user(&user).await;
        scope.close(outcome).await?;

        info!(user_id = %user.id, email = %redact_email(&user.email), "User registered");
        Ok(user)
    }

    pub async fn get_user(
        &self,
        outer: Option<&mut Transaction>,
        id: UserId,
    ) -> CoreResult<Option<User>> {
        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let outcome = scope.tx().find_user(id).await;
        scope.close(outcome).await
    }
}

fn validate_user(user: &User) -> CoreResult<()> {
    if user.username.is_empty() || user.username.len() > MAX_FIELD_LEN {
        return Err(CoreError::Validation(format!(
            "username must be 1-{} characters",
            MAX_FIELD_LEN
        )));
    }

    let well_formed = user
        .email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if !well_formed || user.email.len() > MAX_FIELD_LEN {
        return Err(CoreError::Validation(format!(
            "malformed email: {}",
            redact_email(&user.email)
        )));
    }

    Ok(())
}
