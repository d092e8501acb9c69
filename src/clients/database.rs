use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    dispatch::{NotificationStore, RecipientSource},
    error::DispatchError,
    models::notification::{ChannelType, Notification},
};

const SELECT_NOTIFICATION: &str = r#"
    SELECT id, template_id, channels, context_vars, title, category
    FROM notifications.notifications
    WHERE id = $1
"#;

const SELECT_USER_PAGE: &str = r#"
    SELECT user_id
    FROM notifications.notification_users
    WHERE notification_id = $1
      AND ($2::uuid IS NULL OR user_id > $2)
    ORDER BY user_id
    LIMIT $3
"#;

/// Notification definitions and their audiences.
#[derive(Clone)]
pub struct DatabaseClient {
    client: Arc<Client>,
}

impl DatabaseClient {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }

    async fn fetch_user_page(
        &self,
        notification_id: Uuid,
        after: Option<Uuid>,
        page_size: usize,
    ) -> Result<Vec<Uuid>, DispatchError> {
        let limit = i64::try_from(page_size).unwrap_or(i64::MAX);
        let rows = self
            .client
            .query(SELECT_USER_PAGE, &[&notification_id, &after, &limit])
            .await?;

        let page = rows
            .iter()
            .map(|row| row.try_get::<_, Uuid>("user_id"))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(%notification_id, users = page.len(), "Fetched audience page");

        Ok(page)
    }
}

fn notification_from_row(row: &Row) -> Result<Notification, DispatchError> {
    let channels: Vec<String> = row.try_get("channels")?;

    Ok(Notification {
        id: row.try_get("id")?,
        template_id: row.try_get("template_id")?,
        channels: channels.into_iter().map(ChannelType::new).collect(),
        context_vars: row.try_get("context_vars")?,
        title: row.try_get("title")?,
        category: row.try_get("category")?,
    })
}

#[async_trait]
impl NotificationStore for DatabaseClient {
    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, DispatchError> {
        let row = self.client.query_opt(SELECT_NOTIFICATION, &[&id]).await?;
        row.as_ref().map(notification_from_row).transpose()
    }
}

enum Cursor {
    Start,
    After(Uuid),
    Done,
}

impl Cursor {
    /// Where the next query starts; a page shorter than `page_size` is the last one.
    fn after_page(page: &[Uuid], page_size: usize) -> Self {
        match page.last() {
            Some(last) if page.len() >= page_size => Cursor::After(*last),
            _ => Cursor::Done,
        }
    }
}

async fn next_keyset_page<F, Fut>(
    cursor: Cursor,
    fetch: F,
    page_size: usize,
) -> Result<Option<(Vec<Uuid>, (Cursor, F))>, DispatchError>
where
    F: Fn(Option<Uuid>) -> Fut,
    Fut: Future<Output = Result<Vec<Uuid>, DispatchError>>,
{
    let after = match cursor {
        Cursor::Start => None,
        Cursor::After(last) => Some(last),
        Cursor::Done => return Ok(None),
    };

    let pending = fetch(after);
    let page = pending.await?;
    if page.is_empty() {
        return Ok(None);
    }

    let next = Cursor::after_page(&page, page_size);
    Ok(Some((page, (next, fetch))))
}

/// Keyset pagination: `fetch` receives the last id of the previous page and
/// returns the next ids in ascending order. Empty pages are never yielded.
pub fn keyset_pages<'a, F, Fut>(
    page_size: usize,
    fetch: F,
) -> BoxStream<'a, Result<Vec<Uuid>, DispatchError>>
where
    F: Fn(Option<Uuid>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Vec<Uuid>, DispatchError>> + Send + 'a,
{
    stream::try_unfold((Cursor::Start, fetch), move |(cursor, fetch)| {
        next_keyset_page(cursor, fetch, page_size)
    })
    .boxed()
}

impl RecipientSource for DatabaseClient {
    fn stream_users(
        &self,
        notification_id: Uuid,
        page_size: usize,
    ) -> BoxStream<'_, Result<Vec<Uuid>, DispatchError>> {
        keyset_pages(page_size, move |after| {
            self.fetch_user_page(notification_id, after, page_size)
        })
    }
}
