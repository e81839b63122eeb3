use cwblog_core::db::open_db_in_memory;
use cwblog_core::model::association::association_pairs;
use cwblog_core::{
    ActorId, AssociationRef, CancelToken, Category, CategoryPayload, EntityKind, EntityStore,
    ErrorKind, Listing, MutationCoordinator, PathIdentifiers, Post, PostPayload, PostStatus,
    RequestContext, ResourceResolver, SqliteEntityStore, Tag, TagPayload, UserPayload,
};
use rusqlite::Connection;
use std::time::Instant;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn author() -> RequestContext {
    RequestContext::for_actor(ActorId::Uid("author-1".to_string()))
}

fn register_author(store: &SqliteEntityStore<'_>) {
    MutationCoordinator::new(store)
        .register_user(UserPayload {
            uid: Some("author-1".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            email: Some("ada@example.com".to_string()),
        })
        .unwrap();
}

fn create_tag(store: &SqliteEntityStore<'_>, slug: &str) -> Tag {
    MutationCoordinator::new(store)
        .create::<Tag>(
            &author(),
            TagPayload {
                name: Some(slug.to_uppercase()),
                slug: Some(slug.to_string()),
                ..TagPayload::default()
            },
        )
        .unwrap()
}

fn post_payload(slug: &str, tags: Vec<AssociationRef>) -> PostPayload {
    PostPayload {
        title: Some(format!("Post {slug}")),
        slug: Some(slug.to_string()),
        html: Some("<p>body</p>".to_string()),
        tags: Some(tags),
        ..PostPayload::default()
    }
}

fn create_post(store: &SqliteEntityStore<'_>, slug: &str, tags: Vec<AssociationRef>) -> Post {
    MutationCoordinator::new(store)
        .create::<Post>(&author(), post_payload(slug, tags))
        .unwrap()
}

fn resolve_post(store: &SqliteEntityStore<'_>, id: i64) -> Post {
    ResourceResolver::new(store)
        .resolve::<Post>(author(), &PathIdentifiers::by_id(id))
        .unwrap()
        .into_entity()
}

fn update_post(
    store: &SqliteEntityStore<'_>,
    id: i64,
    payload: PostPayload,
) -> Result<Post, cwblog_core::BlogError> {
    let resolved = ResourceResolver::new(store)
        .resolve::<Post>(author(), &PathIdentifiers::by_id(id))
        .unwrap();
    MutationCoordinator::new(store).update(resolved, payload)
}

fn tags_only(tags: Vec<AssociationRef>) -> PostPayload {
    PostPayload {
        tags: Some(tags),
        ..PostPayload::default()
    }
}

fn sorted_tag_pairs(post: &Post) -> Vec<(i64, i64)> {
    let mut pairs = association_pairs(&post.tags);
    pairs.sort_unstable();
    pairs
}

fn edge_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn create_returns_slug_and_resolves_by_slug() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let go = create_tag(&store, "go");

    let created = create_post(&store, "hello-world", vec![AssociationRef::new(go.id, 0)]);
    assert!(created.id > 0);
    assert_eq!(created.slug, "hello-world");
    assert_eq!(created.user.as_ref().unwrap().uid, "author-1");

    let resolved = ResourceResolver::new(&store)
        .resolve::<Post>(author(), &PathIdentifiers::by_slug("hello-world"))
        .unwrap()
        .into_entity();
    assert_eq!(resolved.id, created.id);
    assert_eq!(resolved.user_id, created.user_id);
    assert_eq!(association_pairs(&resolved.tags), vec![(go.id, 0)]);
}

#[test]
fn replacing_tag_set_yields_exactly_the_new_set_and_is_idempotent() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let a = create_tag(&store, "a");
    let b = create_tag(&store, "b");
    let c = create_tag(&store, "c");
    let post = create_post(&store, "post", vec![AssociationRef::new(a.id, 0)]);

    let desired = vec![AssociationRef::new(b.id, 0), AssociationRef::new(c.id, 1)];
    update_post(&store, post.id, tags_only(desired.clone())).unwrap();
    let first = resolve_post(&store, post.id);
    assert_eq!(sorted_tag_pairs(&first), vec![(b.id, 0), (c.id, 1)]);

    update_post(&store, post.id, tags_only(desired)).unwrap();
    let second = resolve_post(&store, post.id);
    assert_eq!(sorted_tag_pairs(&second), sorted_tag_pairs(&first));
    assert_eq!(edge_count(&conn, "post_tags"), 2);
}

#[test]
fn go_tag_scenario() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let go = create_tag(&store, "go");
    assert_eq!(go.id, 1);
    let rust = create_tag(&store, "rust");
    assert_eq!(rust.id, 2);
    let post = create_post(&store, "scenario", Vec::new());

    update_post(
        &store,
        post.id,
        tags_only(vec![AssociationRef::new(1, 0), AssociationRef::new(2, 1)]),
    )
    .unwrap();
    assert_eq!(
        sorted_tag_pairs(&resolve_post(&store, post.id)),
        vec![(1, 0), (2, 1)]
    );

    update_post(&store, post.id, tags_only(Vec::new())).unwrap();
    assert!(resolve_post(&store, post.id).tags.is_empty());
}

#[test]
fn empty_list_detaches_all_and_absent_list_keeps_set() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let a = create_tag(&store, "a");
    let post = create_post(&store, "post", vec![AssociationRef::new(a.id, 3)]);

    let renamed = update_post(
        &store,
        post.id,
        PostPayload {
            title: Some("Renamed".to_string()),
            ..PostPayload::default()
        },
    )
    .unwrap();
    assert_eq!(renamed.title, "Renamed");
    assert_eq!(association_pairs(&renamed.tags), vec![(a.id, 3)]);

    let detached = update_post(&store, post.id, tags_only(Vec::new())).unwrap();
    assert!(detached.tags.is_empty());
    assert_eq!(detached.title, "Renamed");
    assert_eq!(edge_count(&conn, "post_tags"), 0);
}

fn record_edge_deletes(conn: &Connection) {
    conn.execute_batch(
        "CREATE TABLE edge_deletes (tbl TEXT NOT NULL);
         CREATE TRIGGER post_tags_deleted AFTER DELETE ON post_tags
         BEGIN INSERT INTO edge_deletes (tbl) VALUES ('post_tags'); END;
         CREATE TRIGGER post_categories_deleted AFTER DELETE ON post_categories
         BEGIN INSERT INTO edge_deletes (tbl) VALUES ('post_categories'); END;",
    )
    .unwrap();
}

fn edge_deletes(conn: &Connection, table: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM edge_deletes WHERE tbl = ?1;",
        [table],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn update_only_touches_association_kinds_it_lists() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let a = create_tag(&store, "a");
    let b = create_tag(&store, "b");
    let news = MutationCoordinator::new(&store)
        .create::<Category>(
            &author(),
            CategoryPayload {
                name: Some("News".to_string()),
                slug: Some("news".to_string()),
                ..CategoryPayload::default()
            },
        )
        .unwrap();
    let post = MutationCoordinator::new(&store)
        .create::<Post>(
            &author(),
            PostPayload {
                categories: Some(vec![AssociationRef::new(news.id, 0)]),
                ..post_payload(
                    "partial",
                    vec![AssociationRef::new(a.id, 0), AssociationRef::new(b.id, 1)],
                )
            },
        )
        .unwrap();
    record_edge_deletes(&conn);

    let renamed = update_post(
        &store,
        post.id,
        PostPayload {
            title: Some("New".to_string()),
            ..PostPayload::default()
        },
    )
    .unwrap();
    assert_eq!(renamed.title, "New");
    assert_eq!(edge_deletes(&conn, "post_tags"), 0);
    assert_eq!(edge_deletes(&conn, "post_categories"), 0);

    let recategorized = update_post(
        &store,
        post.id,
        PostPayload {
            categories: Some(Vec::new()),
            ..PostPayload::default()
        },
    )
    .unwrap();
    assert!(recategorized.categories.is_empty());
    assert_eq!(
        association_pairs(&recategorized.tags),
        vec![(a.id, 0), (b.id, 1)]
    );
    assert_eq!(edge_deletes(&conn, "post_tags"), 0);
    assert_eq!(edge_deletes(&conn, "post_categories"), 1);
}

#[test]
fn loaded_tags_are_ordered_by_sort() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let a = create_tag(&store, "a");
    let b = create_tag(&store, "b");
    let c = create_tag(&store, "c");
    let post = create_post(
        &store,
        "ordered",
        vec![
            AssociationRef::new(a.id, 2),
            AssociationRef::new(b.id, 0),
            AssociationRef::new(c.id, 1),
        ],
    );

    let ids: Vec<_> = resolve_post(&store, post.id)
        .tags
        .iter()
        .map(|tag| tag.child_id)
        .collect();
    assert_eq!(ids, vec![b.id, c.id, a.id]);
}

#[test]
fn unknown_child_rolls_back_the_whole_update() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let a = create_tag(&store, "a");
    let post = create_post(&store, "post", vec![AssociationRef::new(a.id, 0)]);

    let err = update_post(
        &store,
        post.id,
        PostPayload {
            title: Some("Changed".to_string()),
            tags: Some(vec![AssociationRef::new(a.id, 0), AssociationRef::new(999, 1)]),
            ..PostPayload::default()
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    let current = resolve_post(&store, post.id);
    assert_eq!(current.title, "Post post");
    assert_eq!(current.version, 1);
    assert_eq!(association_pairs(&current.tags), vec![(a.id, 0)]);
}

#[test]
fn unknown_child_on_create_persists_nothing() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);

    let err = MutationCoordinator::new(&store)
        .create::<Post>(
            &author(),
            post_payload("orphan", vec![AssociationRef::new(42, 0)]),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(store.count(EntityKind::Post).unwrap(), 0);
    assert!(!store.exists_by_slug(EntityKind::Post, "orphan", None).unwrap());
}

#[test]
fn duplicate_child_ids_are_rejected() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let a = create_tag(&store, "a");
    let post = create_post(&store, "post", Vec::new());

    let err = update_post(
        &store,
        post.id,
        tags_only(vec![AssociationRef::new(a.id, 0), AssociationRef::new(a.id, 1)]),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert!(resolve_post(&store, post.id).tags.is_empty());
}

#[test]
fn create_requires_a_known_actor() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let coordinator = MutationCoordinator::new(&store);

    let anonymous = coordinator
        .create::<Post>(&RequestContext::anonymous(), post_payload("anon", Vec::new()))
        .unwrap_err();
    assert_eq!(anonymous.kind(), ErrorKind::InvalidRequest);

    let ghost = coordinator
        .create::<Post>(
            &RequestContext::for_actor(ActorId::Uid("ghost".to_string())),
            post_payload("ghost", Vec::new()),
        )
        .unwrap_err();
    assert_eq!(ghost.kind(), ErrorKind::InvalidRequest);

    let by_user_id = coordinator
        .create::<Post>(
            &RequestContext::for_actor(ActorId::UserId(1)),
            post_payload("by-id", Vec::new()),
        )
        .unwrap();
    assert_eq!(by_user_id.user_id, 1);
    assert_eq!(store.count(EntityKind::Post).unwrap(), 1);
}

#[test]
fn invalid_payload_is_rejected_before_any_write() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);

    let err = MutationCoordinator::new(&store)
        .create::<Post>(&author(), post_payload("not a slug", Vec::new()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(store.count(EntityKind::Post).unwrap(), 0);
}

#[test]
fn duplicate_slug_create_conflicts() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    create_post(&store, "taken", Vec::new());

    let err = MutationCoordinator::new(&store)
        .create::<Post>(&author(), post_payload("taken", Vec::new()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(store.count(EntityKind::Post).unwrap(), 1);
}

#[test]
fn slug_collision_on_update_conflicts() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    create_post(&store, "first", Vec::new());
    let second = create_post(&store, "second", Vec::new());

    let err = update_post(
        &store,
        second.id,
        PostPayload {
            slug: Some("first".to_string()),
            ..PostPayload::default()
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(resolve_post(&store, second.id).slug, "second");

    // Keeping its own slug is not a collision.
    let kept = update_post(
        &store,
        second.id,
        PostPayload {
            slug: Some("second".to_string()),
            ..PostPayload::default()
        },
    )
    .unwrap();
    assert_eq!(kept.version, 2);
}

#[test]
fn stale_version_conflicts() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let post = create_post(&store, "versioned", Vec::new());
    assert_eq!(post.version, 1);

    let updated = update_post(
        &store,
        post.id,
        PostPayload {
            title: Some("v2".to_string()),
            version: Some(1),
            ..PostPayload::default()
        },
    )
    .unwrap();
    assert_eq!(updated.version, 2);

    let err = update_post(
        &store,
        post.id,
        PostPayload {
            title: Some("stale".to_string()),
            version: Some(1),
            ..PostPayload::default()
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(resolve_post(&store, post.id).title, "v2");
}

#[test]
fn publishing_stamps_published_at() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let post = create_post(&store, "draft", Vec::new());
    assert!(post.published_at.is_none());

    let published = update_post(
        &store,
        post.id,
        PostPayload {
            status: Some(PostStatus::Published),
            ..PostPayload::default()
        },
    )
    .unwrap();
    assert_eq!(published.status, PostStatus::Published);
    assert!(published.published_at.is_some());
}

#[test]
fn categories_are_synchronized_alongside_tags() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let tag = create_tag(&store, "a");
    let news = MutationCoordinator::new(&store)
        .create::<Category>(
            &author(),
            CategoryPayload {
                name: Some("News".to_string()),
                slug: Some("news".to_string()),
                ..CategoryPayload::default()
            },
        )
        .unwrap();

    let created = MutationCoordinator::new(&store)
        .create::<Post>(
            &author(),
            PostPayload {
                categories: Some(vec![AssociationRef::new(news.id, 0)]),
                ..post_payload("both", vec![AssociationRef::new(tag.id, 0)])
            },
        )
        .unwrap();

    let resolved = resolve_post(&store, created.id);
    assert_eq!(association_pairs(&resolved.tags), vec![(tag.id, 0)]);
    assert_eq!(association_pairs(&resolved.categories), vec![(news.id, 0)]);
    assert_eq!(
        resolved.categories[0].child.as_ref().unwrap().name,
        "News"
    );

    let updated = update_post(
        &store,
        created.id,
        PostPayload {
            categories: Some(Vec::new()),
            ..PostPayload::default()
        },
    )
    .unwrap();
    assert!(updated.categories.is_empty());
    assert_eq!(association_pairs(&updated.tags), vec![(tag.id, 0)]);
}

#[test]
fn delete_returns_snapshot_and_cascades_edges() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let a = create_tag(&store, "a");
    let post = create_post(&store, "doomed", vec![AssociationRef::new(a.id, 0)]);

    let resolved = ResourceResolver::new(&store)
        .resolve::<Post>(author(), &PathIdentifiers::by_id(post.id))
        .unwrap();
    let snapshot = MutationCoordinator::new(&store).delete(resolved).unwrap();
    assert_eq!(snapshot.slug, "doomed");
    assert_eq!(association_pairs(&snapshot.tags), vec![(a.id, 0)]);

    assert_eq!(edge_count(&conn, "post_tags"), 0);
    let err = ResourceResolver::new(&store)
        .resolve::<Post>(author(), &PathIdentifiers::by_id(post.id))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(store.count(EntityKind::Tag).unwrap(), 1);
}

#[test]
fn deleting_twice_is_not_found() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let post = create_post(&store, "twice", Vec::new());
    let resolver = ResourceResolver::new(&store);
    let coordinator = MutationCoordinator::new(&store);

    let first = resolver
        .resolve::<Post>(author(), &PathIdentifiers::by_id(post.id))
        .unwrap();
    let second = resolver
        .resolve::<Post>(author(), &PathIdentifiers::by_id(post.id))
        .unwrap();
    coordinator.delete(first).unwrap();
    let err = coordinator.delete(second).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn expired_request_persists_nothing() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);

    let ctx = author().with_deadline(Instant::now());
    let err = MutationCoordinator::new(&store)
        .create::<Post>(&ctx, post_payload("late", Vec::new()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(store.count(EntityKind::Post).unwrap(), 0);
}

#[test]
fn cancelled_request_leaves_post_unchanged() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let a = create_tag(&store, "a");
    let post = create_post(&store, "steady", vec![AssociationRef::new(a.id, 0)]);

    let token = CancelToken::new();
    let resolved = ResourceResolver::new(&store)
        .resolve::<Post>(
            author().with_cancel_token(token.clone()),
            &PathIdentifiers::by_id(post.id),
        )
        .unwrap();
    token.cancel();

    let err = MutationCoordinator::new(&store)
        .update(resolved, tags_only(Vec::new()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(
        association_pairs(&resolve_post(&store, post.id).tags),
        vec![(a.id, 0)]
    );
}

#[test]
fn listing_loads_associations_in_id_order() {
    let conn = setup();
    let store = SqliteEntityStore::blog(&conn).unwrap();
    register_author(&store);
    let a = create_tag(&store, "a");
    let first = create_post(&store, "first", vec![AssociationRef::new(a.id, 0)]);
    let second = create_post(&store, "second", Vec::new());

    let posts = Listing::new(&store).list::<Post>().unwrap();
    let ids: Vec<_> = posts.iter().map(|post| post.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
    assert_eq!(association_pairs(&posts[0].tags), vec![(a.id, 0)]);
    assert!(posts[1].tags.is_empty());
    assert!(posts.iter().all(|post| post.user.is_some()));
}
