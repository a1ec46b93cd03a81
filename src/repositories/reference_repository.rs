use serde_json::Value;
use uuid::Uuid;

use crate::models::reference::ReferenceTable;
use crate::repositories::supabase_rest::{Caller, RepoError, SupabaseRest};

/// CRUD over the admin-managed reference tables, always as the signed-in user.
#[derive(Clone)]
pub struct ReferenceRepository {
    rest: SupabaseRest,
}

impl ReferenceRepository {
    pub fn new(rest: SupabaseRest) -> Self {
        Self { rest }
    }

    pub async fn list(&self, token: &str, table: ReferenceTable) -> Result<Vec<Value>, RepoError> {
        self.rest
            .select(
                Caller::User(token),
                table.table_name(),
                &[("select", "*".to_string()), ("order", table.order().to_string())],
            )
            .await
    }

    pub async fn insert(&self, token: &str, table: ReferenceTable, row: &Value) -> Result<Value, RepoError> {
        self.rest.insert(Caller::User(token), table.table_name(), row).await
    }

    pub async fn update(
        &self,
        token: &str,
        table: ReferenceTable,
        id: Uuid,
        row: &Value,
    ) -> Result<Value, RepoError> {
        self.rest
            .update(Caller::User(token), table.table_name(), ("id", id.to_string()), row)
            .await
    }

    pub async fn delete(&self, token: &str, table: ReferenceTable, id: Uuid) -> Result<Value, RepoError> {
        self.rest
            .delete(Caller::User(token), table.table_name(), ("id", id.to_string()))
            .await
    }
}
