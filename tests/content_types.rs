//! Content type lookups and invalidation through the public service.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nucache::cache::CacheConfig;
use nucache::domain::content_type::PublishedContentType;
use nucache::domain::error::CacheError;
use nucache::domain::value::ConverterRegistry;
use nucache::infra::memory::MemorySource;
use nucache::snapshot::PublishedSnapshotService;
use nucache_records::{ContentVariation, ItemKind, PropertyTypeRecord, SeedFile, ValueType};

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

fn subtitle() -> PropertyTypeRecord {
    PropertyTypeRecord {
        alias: "subtitle".to_string(),
        data_type_id: 11,
        editor_alias: String::new(),
        value_type: ValueType::Text,
        variations: ContentVariation::Nothing,
        cache_level: None,
    }
}

#[test]
fn alias_and_id_lookups_share_one_instance() {
    let (_, service) = service();
    let types = service.content_types();

    let by_alias = types.get(ItemKind::Content, "HOME").expect("by alias");
    let by_id = types.get_by_id(ItemKind::Content, 1).expect("by id");
    assert!(Arc::ptr_eq(&by_alias, &by_id));

    let err = types
        .get(ItemKind::Media, "home")
        .expect_err("home is not a media type");
    assert!(matches!(err, CacheError::ContentTypeNotFound { .. }));
}

#[test]
fn data_type_change_rebinds_only_nodes_that_use_it() {
    let (source, service) = service();
    let before = service.create_snapshot(false);
    let page_type = Arc::clone(
        before
            .content()
            .get_by_id(1173)
            .expect("sub1")
            .content_type(),
    );

    let mut home = source
        .seed()
        .content_types
        .into_iter()
        .find(|record| record.alias == "home")
        .expect("home type");
    home.property_types.push(subtitle());
    source.upsert_content_type(home);
    service.trigger().clear_data_type(11).expect("clear data type");

    let old_home = before.content().get_by_id(1046).expect("old home");
    assert!(old_home.property("subtitle").is_none());

    let after = service.create_snapshot(false);
    let new_home = after.content().get_by_id(1046).expect("new home");
    assert!(new_home.property("subtitle").is_some());
    assert!(
        !new_home
            .has_value("subtitle", &nucache::domain::variant::VariantKey::invariant())
            .expect("has value")
    );

    let sub1 = after.content().get_by_id(1173).expect("sub1");
    assert!(Arc::ptr_eq(&page_type, sub1.content_type()));
}

#[test]
fn content_type_change_reaches_preview_and_live() {
    let (source, service) = service();

    let mut page = source
        .seed()
        .content_types
        .into_iter()
        .find(|record| record.alias == "page")
        .expect("page type");
    page.property_types.retain(|property| property.alias != "related");
    source.upsert_content_type(page);
    service.trigger().clear_content_type(2).expect("clear content type");

    for preview in [false, true] {
        let snapshot = service.create_snapshot(preview);
        let sub1 = snapshot.content().get_by_id(1173).expect("sub1");
        assert!(sub1.property("related").is_none());
        assert!(sub1.property("body").is_some());
    }
}

#[test]
fn overridden_resolvers_replace_the_source() {
    let (_, service) = service();
    let types = service.content_types();
    let home = types.get(ItemKind::Content, "home").expect("home");
    let calls = Arc::new(AtomicUsize::new(0));

    let counted = Arc::clone(&calls);
    let resolved = Arc::clone(&home);
    types.override_alias_resolver(Arc::new(
        move |kind: ItemKind, alias: &str| -> Option<Arc<PublishedContentType>> {
            counted.fetch_add(1, Ordering::SeqCst);
            (kind == ItemKind::Content && alias.eq_ignore_ascii_case("start"))
                .then(|| Arc::clone(&resolved))
        },
    ));
    assert!(types.is_empty());

    let start = types.get(ItemKind::Content, "start").expect("start");
    assert!(Arc::ptr_eq(&start, &home));
    // cached under the resolved type's own alias
    types.get(ItemKind::Content, "home").expect("home");
    assert!(types.get(ItemKind::Content, "missing").is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
