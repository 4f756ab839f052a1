//! Readers keep the generation they started with while writers publish.

use std::sync::Arc;
use std::thread;

use nucache::cache::CacheConfig;
use nucache::domain::value::{ConverterRegistry, PropertyValue};
use nucache::domain::variant::VariantKey;
use nucache::infra::memory::MemorySource;
use nucache::snapshot::PublishedSnapshotService;
use nucache_records::{ContentNodeKit, ItemKind, SeedFile};
use uuid::Uuid;

fn seed() -> SeedFile {
    serde_json::from_str(include_str!("fixtures/site.json")).expect("fixture should parse")
}

fn service() -> (Arc<MemorySource>, PublishedSnapshotService) {
    let source = Arc::new(MemorySource::new(seed()));
    let service = PublishedSnapshotService::new(
        CacheConfig::default(),
        source.clone(),
        source.clone(),
        ConverterRegistry::new(),
    );
    service.load_all().expect("initial load");
    (source, service)
}

fn kit(seed: &SeedFile, id: i32) -> ContentNodeKit {
    seed.content
        .iter()
        .find(|kit| kit.node.id == id)
        .cloned()
        .expect("kit in fixture")
}

fn child_ids(service: &PublishedSnapshotService, preview: bool, parent: i32) -> Vec<i32> {
    service.with_snapshot(preview, |snapshot| {
        snapshot
            .content()
            .children_of(parent)
            .iter()
            .map(|child| child.id())
            .collect()
    })
}

#[test]
fn home_is_hidden_live_and_shown_in_preview() {
    let (_, service) = service();

    let live = service.with_snapshot(false, |snapshot| {
        let home = snapshot.content().get_by_id(1046).expect("home");
        home.value(&snapshot.value_scope(), "hidden", &VariantKey::invariant())
            .expect("hidden")
    });
    assert_eq!(*live, PropertyValue::Boolean(true));

    let draft = service.with_snapshot(true, |snapshot| {
        let home = snapshot.content().get_by_id(1046).expect("home draft");
        assert!(home.is_preview());
        home.value(&snapshot.value_scope(), "hidden", &VariantKey::invariant())
            .expect("hidden")
    });
    assert_eq!(*draft, PropertyValue::Boolean(false));
}

#[test]
fn content_pickers_resolve_to_keys_of_live_nodes() {
    let (_, service) = service();
    service.with_snapshot(false, |snapshot| {
        let home = snapshot.content().get_by_id(1046).expect("home");
        let featured = home
            .value(&snapshot.value_scope(), "featured", &VariantKey::invariant())
            .expect("featured");
        let key = Uuid::parse_str("00000000-0000-0000-0000-000000001173").expect("uuid");
        assert_eq!(*featured, PropertyValue::ContentRef(key));
        assert_eq!(
            snapshot.content().get_by_key(key).map(|content| content.id()),
            Some(1173)
        );
    });
}

#[test]
fn deleted_node_stays_visible_to_older_snapshots() {
    let (source, service) = service();
    let before = service.create_snapshot(false);

    source.remove_node(ItemKind::Content, 1175);
    service
        .trigger()
        .apply_changes(&[1175], ItemKind::Content)
        .expect("apply");

    assert!(before.content().get_by_id(1175).is_some());
    let before_children: Vec<i32> = before
        .content()
        .children_of(1046)
        .iter()
        .map(|child| child.id())
        .collect();
    assert_eq!(before_children, vec![1173, 1175]);

    assert!(service.with_snapshot(false, |after| after.content().get_by_id(1175).is_none()));
    assert_eq!(child_ids(&service, false, 1046), vec![1173]);
}

#[test]
fn publishing_a_draft_only_node_makes_it_live() {
    let (source, service) = service();
    assert_eq!(child_ids(&service, false, 1173), vec![1174, 1176]);

    let mut custom = kit(&source.seed(), 1177);
    let mut published = custom.draft.clone().expect("draft");
    published.published = true;
    custom.published = Some(published);
    source.upsert_node(ItemKind::Content, custom);
    service
        .trigger()
        .apply_changes(&[1177], ItemKind::Content)
        .expect("apply");

    assert_eq!(child_ids(&service, false, 1173), vec![1174, 1176, 1177]);
    let route = service.with_snapshot(false, |snapshot| snapshot.content().get_route_by_id(1177));
    assert_eq!(route.as_deref(), Some("/sub1/custom-sub-1"));
}

#[test]
fn publishing_a_draft_keeps_the_node_in_preview() {
    let (source, service) = service();
    let mut home = kit(&source.seed(), 1046);
    assert!(home.draft.is_some());
    home.published = home.draft.take();
    source.upsert_node(ItemKind::Content, home);
    service
        .trigger()
        .apply_changes(&[1046], ItemKind::Content)
        .expect("apply");

    service.with_snapshot(true, |snapshot| {
        let home = snapshot.content().get_by_id(1046).expect("home in preview");
        assert!(home.is_preview());
        let hidden = home
            .value(&snapshot.value_scope(), "hidden", &VariantKey::invariant())
            .expect("hidden");
        assert_eq!(*hidden, PropertyValue::Boolean(false));
    });
}

#[test]
fn changes_beyond_one_batch_are_all_applied() {
    let source = Arc::new(MemorySource::new(seed()));
    let service = PublishedSnapshotService::new(
        CacheConfig {
            consume_batch_limit: 1,
            ..CacheConfig::default()
        },
        source.clone(),
        source.clone(),
        ConverterRegistry::new(),
    );
    service.load_all().expect("initial load");

    for id in [1174, 1175] {
        let mut renamed = kit(&source.seed(), id);
        renamed.published.as_mut().expect("published").name = format!("Renamed {id}");
        source.upsert_node(ItemKind::Content, renamed);
    }
    service
        .trigger()
        .apply_changes(&[1174, 1175], ItemKind::Content)
        .expect("apply");

    assert!(service.trigger().queue().is_empty());
    service.with_snapshot(false, |snapshot| {
        for id in [1174, 1175] {
            let content = snapshot.content().get_by_id(id).expect("renamed node");
            assert_eq!(content.name(None), format!("Renamed {id}"));
        }
    });
}

#[test]
fn dropping_snapshots_releases_generations() {
    let (_, service) = service();
    let content = Arc::clone(service.stores().get(ItemKind::Content));
    assert_eq!(content.live_generations(), 1);

    let held = service.create_snapshot(false);
    service
        .trigger()
        .remove(ItemKind::Content, 1175)
        .expect("remove");
    assert_eq!(content.live_generations(), 2);

    drop(held);
    assert_eq!(content.live_generations(), 1);
}

#[test]
fn concurrent_readers_always_see_a_whole_tree() {
    let (source, service) = service();
    let original = kit(&source.seed(), 1175);

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..200 {
                    let snapshot = service.create_snapshot(false);
                    let content = snapshot.content();
                    for root in content.get_at_root() {
                        for child in content.children_of(root.id()) {
                            assert!(content.get_by_id(child.id()).is_some());
                            assert_eq!(child.parent_id(), root.id());
                        }
                    }
                }
            });
        }

        scope.spawn(|| {
            for round in 0..51 {
                if round % 2 == 0 {
                    source.remove_node(ItemKind::Content, 1175);
                } else {
                    source.upsert_node(ItemKind::Content, original.clone());
                }
                service
                    .trigger()
                    .apply_changes(&[1175], ItemKind::Content)
                    .expect("apply");
            }
        });
    });

    // the last round removes
    assert_eq!(child_ids(&service, false, 1046), vec![1173]);
}

#[test]
fn snapshots_can_move_to_a_worker_thread() {
    let (_, service) = service();
    let snapshot = service.create_snapshot(true);
    let worker = thread::spawn(move || {
        let home = snapshot.content().get_by_id(1046)?;
        Some((home.id(), home.is_preview()))
    });
    assert_eq!(worker.join().expect("worker"), Some((1046, true)));
}
