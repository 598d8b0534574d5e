//! Favorite Service - Per-User Page Bookmarks
//!
//! Favoriting needs `view` on the page. Adding a page twice returns the
//! original bookmark. Favorites of a permanently deleted page disappear with
//! it; archived pages keep their favorite but drop out of the listing.

use crate::db::{access_store, node_store};
use crate::models::{Page, PageFavorite, PermissionLevel};
use crate::services::context::ServiceContext;
use crate::services::error::TreeServiceError;
use crate::services::permission::require_level;
use chrono::Utc;

/// Largest page of favorites returned at once
pub const MAX_FAVORITES_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct FavoriteService {
    ctx: ServiceContext,
}

impl FavoriteService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn add_favorite(
        &self,
        actor_id: &str,
        page_id: &str,
    ) -> Result<PageFavorite, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<PageFavorite, TreeServiceError> = async {
            if node_store::get_page(&conn, page_id).await?.is_none() {
                return Err(TreeServiceError::not_found("page", page_id));
            }
            require_level(
                self.ctx.permissions.as_ref(),
                page_id,
                actor_id,
                PermissionLevel::View,
            )
            .await?;

            let candidate = PageFavorite {
                id: self.ctx.ids.next_id(),
                user_id: actor_id.to_string(),
                page_id: page_id.to_string(),
                created_at: Utc::now(),
            };
            if !access_store::insert_favorite_if_absent(&conn, &candidate).await? {
                tracing::debug!(page_id, actor_id, "page already favorited");
            }
            access_store::get_favorite(&conn, actor_id, page_id)
                .await?
                .ok_or_else(|| TreeServiceError::not_found("favorite", &candidate.id))
        }
        .await;
        self.ctx.finish(&conn, "add favorite", result).await
    }

    /// Returns whether a favorite was removed
    pub async fn remove_favorite(
        &self,
        actor_id: &str,
        page_id: &str,
    ) -> Result<bool, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<bool, TreeServiceError> = async {
            Ok(access_store::delete_favorite(&conn, actor_id, page_id).await? > 0)
        }
        .await;
        self.ctx.finish(&conn, "remove favorite", result).await
    }

    /// Live favorited pages, most recent first
    ///
    /// Pages the actor can no longer view are left out of the slice.
    pub async fn list_favorites(
        &self,
        actor_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Page>, TreeServiceError> {
        let limit = limit
            .unwrap_or(MAX_FAVORITES_LIMIT)
            .clamp(1, MAX_FAVORITES_LIMIT);
        let conn = self.ctx.db.connect_with_timeout().await?;
        let pages = access_store::list_favorite_pages(&conn, actor_id, limit, offset).await?;

        let mut visible = Vec::with_capacity(pages.len());
        for page in pages {
            let level = self
                .ctx
                .permissions
                .effective_level(&page.id, actor_id)
                .await?;
            if level.satisfies(PermissionLevel::View) {
                visible.push(page);
            }
        }
        Ok(visible)
    }

    pub async fn is_favorited(
        &self,
        actor_id: &str,
        page_id: &str,
    ) -> Result<bool, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        Ok(access_store::get_favorite(&conn, actor_id, page_id)
            .await?
            .is_some())
    }

    /// All of the actor's favorites, archived pages included
    pub async fn favorites_count(&self, actor_id: &str) -> Result<i64, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        Ok(access_store::count_favorites(&conn, actor_id).await?)
    }
}

#[cfg(test)]
#[path = "favorite_service_test.rs"]
mod favorite_service_test;
