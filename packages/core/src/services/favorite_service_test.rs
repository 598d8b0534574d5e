//! Page Favorite Tests

#[cfg(test)]
mod favorite_tests {
    use crate::config::CoreConfig;
    use crate::models::{NewPage, WorkspaceRole};
    use crate::services::{ServiceContext, TreeServiceError, TreeServices};
    use tempfile::TempDir;

    async fn create_test_services() -> (TreeServices, String, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = CoreConfig::default().with_database_path(temp_dir.path().join("test.db"));
        let services = TreeServices::new(ServiceContext::open(config).await.unwrap());
        let workspace = services
            .workspaces
            .create_workspace("Bookmarks", "alice")
            .await
            .unwrap();
        (services, workspace.id, temp_dir)
    }

    async fn page(services: &TreeServices, workspace_id: &str, title: &str) -> String {
        services
            .pages
            .create_page(
                "alice",
                NewPage {
                    workspace_id: workspace_id.to_string(),
                    title: title.to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_add_is_idempotent_and_remove_reports() {
        let (services, ws, _temp) = create_test_services().await;
        let roadmap = page(&services, &ws, "Roadmap").await;
        let favorites = &services.favorites;

        let first = favorites.add_favorite("alice", &roadmap).await.unwrap();
        let second = favorites.add_favorite("alice", &roadmap).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(favorites.favorites_count("alice").await.unwrap(), 1);
        assert!(favorites.is_favorited("alice", &roadmap).await.unwrap());

        assert!(favorites.remove_favorite("alice", &roadmap).await.unwrap());
        assert!(!favorites.remove_favorite("alice", &roadmap).await.unwrap());
        assert!(!favorites.is_favorited("alice", &roadmap).await.unwrap());
        assert_eq!(favorites.favorites_count("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_listing_is_newest_first_and_skips_archived() {
        let (services, ws, _temp) = create_test_services().await;
        let a = page(&services, &ws, "A").await;
        let b = page(&services, &ws, "B").await;
        let c = page(&services, &ws, "C").await;
        let favorites = &services.favorites;
        for id in [&a, &b, &c] {
            favorites.add_favorite("alice", id).await.unwrap();
        }

        let titles = |pages: Vec<crate::models::Page>| {
            pages.into_iter().map(|p| p.title).collect::<Vec<_>>()
        };
        assert_eq!(
            titles(favorites.list_favorites("alice", None, 0).await.unwrap()),
            vec!["C", "B", "A"]
        );
        assert_eq!(
            titles(favorites.list_favorites("alice", Some(1), 1).await.unwrap()),
            vec!["B"]
        );

        services.pages.archive_page("alice", &b).await.unwrap();
        assert_eq!(
            titles(favorites.list_favorites("alice", None, 0).await.unwrap()),
            vec!["C", "A"]
        );
        assert_eq!(favorites.favorites_count("alice").await.unwrap(), 3);

        // Permanent deletion takes the favorite with it
        services
            .pages
            .delete_page_permanently("alice", &b)
            .await
            .unwrap();
        assert_eq!(favorites.favorites_count("alice").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_favorite_needs_an_existing_visible_page() {
        let (services, ws, _temp) = create_test_services().await;
        let private = page(&services, &ws, "Private").await;
        services
            .workspaces
            .add_member("alice", &ws, "carol", WorkspaceRole::Viewer)
            .await
            .unwrap();

        let missing = services.favorites.add_favorite("alice", "ghost").await;
        assert!(missing.unwrap_err().is_not_found());

        let denied = services.favorites.add_favorite("carol", &private).await;
        assert!(matches!(
            denied,
            Err(TreeServiceError::PermissionDenied { .. })
        ));
        assert_eq!(services.favorites.favorites_count("carol").await.unwrap(), 0);
    }
}
