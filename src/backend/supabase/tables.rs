use crate::backend::supabase::{check, SupabaseBackend};
use crate::backend::BackendError;
use crate::models::{Message, NewMessage, Presence, Profile, UserId};
use chrono::Utc;

impl SupabaseBackend {
    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn table_request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    pub(super) async fn fetch_profiles(&self) -> Result<Vec<Profile>, BackendError> {
        let resp = self
            .table_request(self.http.get(self.table_url("profiles")))
            .query(&[("select", "*"), ("order", "username.asc")])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    pub(super) async fn fetch_profile(&self, id: UserId) -> Result<Option<Profile>, BackendError> {
        let id_filter = format!("eq.{id}");
        let resp = self
            .table_request(self.http.get(self.table_url("profiles")))
            .query(&[("select", "*"), ("id", id_filter.as_str())])
            .send()
            .await?;
        let mut rows: Vec<Profile> = check(resp).await?.json().await?;
        Ok(rows.pop())
    }

    pub(super) async fn patch_presence(
        &self,
        id: UserId,
        status: Presence,
    ) -> Result<(), BackendError> {
        let id_filter = format!("eq.{id}");
        let resp = self
            .table_request(self.http.patch(self.table_url("profiles")))
            .query(&[("id", id_filter.as_str())])
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "status": status, "last_seen": Utc::now() }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub(super) async fn fetch_messages_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<Message>, BackendError> {
        let pair = pair_filter(a, b);
        let resp = self
            .table_request(self.http.get(self.table_url("messages")))
            .query(&[
                ("select", "*"),
                ("or", pair.as_str()),
                ("order", "created_at.asc"),
            ])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    pub(super) async fn create_message(&self, draft: &NewMessage) -> Result<(), BackendError> {
        let resp = self
            .table_request(self.http.post(self.table_url("messages")))
            .header("Prefer", "return=minimal")
            .json(draft)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

/// PostgREST disjunction selecting both directions of a conversation.
fn pair_filter(a: UserId, b: UserId) -> String {
    format!("(and(sender_id.eq.{a},receiver_id.eq.{b}),and(sender_id.eq.{b},receiver_id.eq.{a}))")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_pair_filter_covers_both_directions() {
        let a = Uuid::nil();
        let b = Uuid::max();
        let filter = pair_filter(a, b);
        assert!(filter.starts_with("(and(sender_id.eq."));
        assert!(filter.contains(&format!("sender_id.eq.{a},receiver_id.eq.{b}")));
        assert!(filter.contains(&format!("sender_id.eq.{b},receiver_id.eq.{a}")));
    }
}
