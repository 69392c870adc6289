use chrono::NaiveDate;
use serde_json::json;

use termdb_rust::config::RepositoryConfig;
use termdb_rust::context::{BranchContext, BranchScope, ServiceContext, Services};
use termdb_rust::request::{
    open_repository, open_resource_branch, BranchGetRequest, BranchRequest, CommitRequestBuilder, ConceptSearchFilters,
    ConceptSearchRequestBuilder, DeleteRequestBuilder, ImportRequest, RepositoryRequest, ResourceCreateRequestBuilder,
    ResourceGetRequest, ResourceSearchRequestBuilder, ResourceUpdateRequestBuilder, SearchResourceRequestBuilder,
    SearchResourceRequestIterator, TerminologyResourceRequest, TransactionalRequestBuilder,
    VersionCreateRequestBuilder, VersionSearchRequestBuilder,
};
use termdb_rust::store::SortBy;
use termdb_rust::{
    ApiError, ApiResult, CommitResult, ConceptDocument, Id, Request, RequestBuilder, Resource,
    ResourceDocument, ResourceType, ResourceURI, SettingChange, Settings, SettingsUpdate, UserContext, MAIN_PATH,
    NO_COMMIT_TIMESTAMP, RESOURCES_REPOSITORY, ROOT_ID,
};

fn context() -> ServiceContext {
    ServiceContext::new(
        Services::builder(RepositoryConfig::default()).build(),
        UserContext::default_user(),
    )
}

fn bundle(id: &str, parent: &str) -> ResourceCreateRequestBuilder {
    ResourceCreateRequestBuilder::bundle()
        .set_id(id)
        .set_url(format!("http://example.org/bundles/{}", id))
        .set_title(format!("Bundle {}", id))
        .set_bundle_id(parent)
}

fn code_system(id: &str, tooling_id: &str) -> ResourceCreateRequestBuilder {
    ResourceCreateRequestBuilder::code_system()
        .set_id(id)
        .set_url(format!("http://example.org/codesystems/{}", id))
        .set_title(format!("Code System {}", id))
        .set_tooling_id(tooling_id)
}

async fn create(context: &ServiceContext, builder: ResourceCreateRequestBuilder) -> ApiResult<CommitResult<Id>> {
    builder
        .commit()
        .author("test-author")
        .commit_comment("Create resource")
        .build(RESOURCES_REPOSITORY, MAIN_PATH)
        .execute(context)
        .await
}

async fn update(context: &ServiceContext, builder: ResourceUpdateRequestBuilder) -> ApiResult<CommitResult<bool>> {
    builder
        .commit()
        .author("test-author")
        .commit_comment("Update resource")
        .build(RESOURCES_REPOSITORY, MAIN_PATH)
        .execute(context)
        .await
}

async fn get(context: &ServiceContext, id: &str) -> ApiResult<Resource> {
    RepositoryRequest::new(RESOURCES_REPOSITORY, BranchRequest::new(MAIN_PATH, ResourceGetRequest::new(id)))
        .execute(context)
        .await
}

async fn ancestors(context: &ServiceContext, id: &str) -> Vec<Id> {
    get(context, id).await.unwrap().document.bundle_ancestor_ids
}

fn ids(values: &[&str]) -> Vec<Id> {
    values.iter().map(|value| value.to_string()).collect()
}

async fn resources_branch(context: &ServiceContext) -> BranchContext {
    let repository = open_repository(context, RESOURCES_REPOSITORY).unwrap();
    BranchContext::open(&repository, MAIN_PATH).await.unwrap()
}

#[tokio::test]
async fn test_create_code_system_and_reject_duplicates() {
    let context = context();

    let created = create(&context, code_system("SNOMEDCT", "snomed")).await.unwrap();
    assert!(created.is_committed());
    assert_eq!(created.result, "SNOMEDCT");

    let resource = get(&context, "SNOMEDCT").await.unwrap();
    assert_eq!(resource.document.branch_path.as_deref(), Some("MAIN/SNOMEDCT"));
    assert_eq!(resource.document.bundle_ancestor_ids, ids(&[ROOT_ID]));
    assert_eq!(resource.document.status, "draft");
    assert!(resource.document.created_at.is_some());

    let branch = RepositoryRequest::new("snomed", BranchGetRequest::new("MAIN/SNOMEDCT"))
        .execute(&context)
        .await
        .unwrap();
    assert!(!branch.deleted);

    // same url under a different id
    let duplicate_url = create(
        &context,
        code_system("SNOMEDCT-2", "snomed").set_url("http://example.org/codesystems/SNOMEDCT"),
    )
    .await
    .unwrap_err();
    assert!(matches!(duplicate_url, ApiError::AlreadyExists { ref field, .. } if field == "url"));

    let duplicate_id = create(&context, code_system("SNOMEDCT", "snomed").set_url("http://example.org/other"))
        .await
        .unwrap_err();
    assert!(matches!(duplicate_id, ApiError::AlreadyExists { ref field, .. } if field == "id"));
}

#[tokio::test]
async fn test_create_validation_failures() {
    let context = context();

    let blank = create(&context, bundle("A", ROOT_ID).set_title("  ")).await.unwrap_err();
    match blank {
        ApiError::Validation { violations, .. } => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].property_path, "title");
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let root = create(&context, bundle(ROOT_ID, ROOT_ID)).await.unwrap_err();
    assert_eq!(root.kind(), "Conflict");

    let bad_url = create(&context, bundle("A", ROOT_ID).set_url("ftp://example.org/a")).await.unwrap_err();
    assert!(matches!(bad_url, ApiError::BadRequest(_)));

    let missing_parent = create(&context, bundle("A", "missing")).await.unwrap_err();
    assert!(matches!(missing_parent, ApiError::BadRequest(_)));

    let unknown_tooling = create(&context, code_system("LOINC", "loinc")).await.unwrap_err();
    assert!(matches!(unknown_tooling, ApiError::BadRequest(ref message) if message.contains("loinc")));

    create(&context, code_system("SNOMEDCT", "snomed")).await.unwrap();
    let not_a_bundle = create(&context, bundle("A", "SNOMEDCT")).await.unwrap_err();
    assert!(matches!(not_a_bundle, ApiError::BadRequest(_)));

    let mut settings = Settings::new();
    settings.insert("locale".to_string(), serde_json::Value::Null);
    let null_setting = create(&context, bundle("A", ROOT_ID).set_settings(settings)).await.unwrap_err();
    assert!(matches!(null_setting, ApiError::BadRequest(_)));
}

#[tokio::test]
async fn test_moving_a_bundle_rewrites_descendant_ancestors() {
    let context = context();

    create(&context, bundle("A", ROOT_ID)).await.unwrap();
    create(&context, bundle("B", "A")).await.unwrap();
    create(&context, bundle("C", "B")).await.unwrap();
    create(&context, code_system("D", "snomed").set_bundle_id("C")).await.unwrap();
    create(&context, bundle("E", ROOT_ID)).await.unwrap();

    assert_eq!(ancestors(&context, "D").await, ids(&[ROOT_ID, "A", "B", "C"]));

    let moved = update(&context, ResourceUpdateRequestBuilder::new("B").set_bundle_id("E"))
        .await
        .unwrap();
    assert!(moved.result);
    assert!(moved.is_committed());

    assert_eq!(ancestors(&context, "B").await, ids(&[ROOT_ID, "E"]));
    assert_eq!(ancestors(&context, "C").await, ids(&[ROOT_ID, "E", "B"]));
    assert_eq!(ancestors(&context, "D").await, ids(&[ROOT_ID, "E", "B", "C"]));
    assert_eq!(ancestors(&context, "A").await, ids(&[ROOT_ID]));

    let again = update(&context, ResourceUpdateRequestBuilder::new("B").set_bundle_id("E"))
        .await
        .unwrap();
    assert!(!again.result);
    assert_eq!(again.commit_timestamp, NO_COMMIT_TIMESTAMP);

    let under_ancestor_bundle = ResourceSearchRequestBuilder::new()
        .filter_by_bundle_ancestor_id("E")
        .build();
    let found = RepositoryRequest::new(RESOURCES_REPOSITORY, BranchRequest::new(MAIN_PATH, under_ancestor_bundle))
        .execute(&context)
        .await
        .unwrap();
    assert_eq!(found.total, 3);
}

#[tokio::test]
async fn test_propagation_pages_through_descendants_in_batches() {
    let config = RepositoryConfig {
        descendant_batch_size: 2,
        ..RepositoryConfig::default()
    };
    let context = ServiceContext::new(Services::builder(config).build(), UserContext::default_user());

    create(&context, bundle("A", ROOT_ID)).await.unwrap();
    create(&context, bundle("B", "A")).await.unwrap();
    create(&context, bundle("E", ROOT_ID)).await.unwrap();
    for child in ["c1", "c2", "c3", "c4", "c5"] {
        create(&context, bundle(child, "B")).await.unwrap();
    }
    create(&context, bundle("d", "c4")).await.unwrap();

    let moved = update(&context, ResourceUpdateRequestBuilder::new("B").set_bundle_id("E"))
        .await
        .unwrap();
    assert!(moved.result);

    assert_eq!(ancestors(&context, "B").await, ids(&[ROOT_ID, "E"]));
    for child in ["c1", "c2", "c3", "c4", "c5"] {
        assert_eq!(ancestors(&context, child).await, ids(&[ROOT_ID, "E", "B"]), "{}", child);
    }
    assert_eq!(ancestors(&context, "d").await, ids(&[ROOT_ID, "E", "B", "c4"]));
}

#[tokio::test]
async fn test_bundle_cycles_are_rejected() {
    let context = context();

    create(&context, bundle("A", ROOT_ID)).await.unwrap();
    create(&context, bundle("B", "A")).await.unwrap();
    create(&context, bundle("C", "B")).await.unwrap();

    let into_descendant = update(&context, ResourceUpdateRequestBuilder::new("A").set_bundle_id("C"))
        .await
        .unwrap_err();
    assert!(matches!(into_descendant, ApiError::CycleDetected(_)));

    let into_itself = update(&context, ResourceUpdateRequestBuilder::new("B").set_bundle_id("B"))
        .await
        .unwrap_err();
    assert!(matches!(into_itself, ApiError::CycleDetected(_)));

    assert_eq!(ancestors(&context, "C").await, ids(&[ROOT_ID, "A", "B"]));
}

#[tokio::test]
async fn test_settings_merge_and_no_op_updates() {
    let context = context();

    let settings: Settings = serde_json::from_value(json!({"locale": "en", "publisher": "IHTSDO"})).unwrap();
    create(&context, bundle("A", ROOT_ID).set_settings(settings)).await.unwrap();

    let mut changes = SettingsUpdate::new();
    changes.insert("locale".to_string(), SettingChange::Set(json!("sv")));
    changes.insert("publisher".to_string(), SettingChange::Delete);
    changes.insert("untouched".to_string(), SettingChange::Unset);
    let merged = update(&context, ResourceUpdateRequestBuilder::new("A").set_settings(changes))
        .await
        .unwrap();
    assert!(merged.result);

    let resource = get(&context, "A").await.unwrap();
    assert_eq!(resource.document.settings.get("locale"), Some(&json!("sv")));
    assert!(!resource.document.settings.contains_key("publisher"));
    assert!(!resource.document.settings.contains_key("untouched"));
    assert!(resource.document.updated_at.is_some());

    let same_title = update(&context, ResourceUpdateRequestBuilder::new("A").set_title("Bundle A"))
        .await
        .unwrap();
    assert!(!same_title.result);
    assert_eq!(same_title.commit_timestamp, NO_COMMIT_TIMESTAMP);

    let missing = update(&context, ResourceUpdateRequestBuilder::new("missing").set_title("x"))
        .await
        .unwrap_err();
    assert!(matches!(missing, ApiError::NotFound { .. }));
}

#[tokio::test]
async fn test_url_updates_check_uniqueness() {
    let context = context();

    create(&context, bundle("A", ROOT_ID)).await.unwrap();
    create(&context, bundle("B", ROOT_ID)).await.unwrap();

    let taken = update(
        &context,
        ResourceUpdateRequestBuilder::new("B").set_url("http://example.org/bundles/A"),
    )
    .await
    .unwrap_err();
    assert!(matches!(taken, ApiError::AlreadyExists { .. }));

    let unchanged = update(
        &context,
        ResourceUpdateRequestBuilder::new("B").set_url("http://example.org/bundles/B"),
    )
    .await
    .unwrap();
    assert!(!unchanged.result);
}

#[tokio::test]
async fn test_iterator_pages_through_all_matches() {
    let context = context();

    for index in 0..7 {
        create(&context, bundle(&format!("bundle-{}", index), ROOT_ID)).await.unwrap();
    }

    let branch = resources_branch(&context).await;
    let builder = ResourceSearchRequestBuilder::new()
        .filter_by_resource_type(ResourceType::Bundle)
        .sort_by(vec![SortBy::field("id", true)])
        .set_limit(3);
    let mut iterator = SearchResourceRequestIterator::new(builder, &branch);

    let mut pages = Vec::new();
    while let Some(page) = iterator.next_page().await.unwrap() {
        pages.push(page.items.iter().map(|resource| resource.id().to_string()).collect::<Vec<_>>());
    }

    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0], vec!["bundle-0", "bundle-1", "bundle-2"]);
    assert_eq!(pages[2], vec!["bundle-6"]);
    assert_eq!(iterator.visited(), 7);
}

#[tokio::test]
async fn test_versions_and_latest_resolution() {
    let context = context();
    create(&context, code_system("SNOMEDCT", "snomed")).await.unwrap();

    let uri = ResourceURI::new(ResourceType::CodeSystem, "SNOMEDCT");
    let date = |value: &str| NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap();
    let create_version = |version: &str, effective_time: NaiveDate, force: bool| {
        VersionCreateRequestBuilder::new(uri.clone(), version, effective_time)
            .force(force)
            .commit()
            .author("release-manager")
            .commit_comment(format!("Version {}", version))
            .build(RESOURCES_REPOSITORY, MAIN_PATH)
    };

    let created = create_version("2024-01-31", date("2024-01-31"), false)
        .execute(&context)
        .await
        .unwrap();
    assert_eq!(created.result, "codesystems/SNOMEDCT/2024-01-31");

    let older = create_version("2023-07-31", date("2023-07-31"), false)
        .execute(&context)
        .await
        .unwrap_err();
    assert!(matches!(older, ApiError::BadRequest(ref message) if message.contains("2024-01-31")));

    create_version("2023-07-31", date("2023-07-31"), true)
        .execute(&context)
        .await
        .unwrap();

    let duplicate = create_version("2024-01-31", date("2025-01-31"), false)
        .execute(&context)
        .await
        .unwrap_err();
    assert!(matches!(duplicate, ApiError::AlreadyExists { .. }));

    let latest = open_resource_branch(&context, &uri.with_path("LATEST")).await.unwrap();
    assert_eq!(latest.branch().path, "MAIN/SNOMEDCT/2024-01-31");

    let head = open_resource_branch(&context, &uri).await.unwrap();
    assert_eq!(head.branch().path, "MAIN/SNOMEDCT");

    let versions = RepositoryRequest::new(
        RESOURCES_REPOSITORY,
        BranchRequest::new(MAIN_PATH, VersionSearchRequestBuilder::new().filter_by_resource(&uri).build()),
    )
    .execute(&context)
    .await
    .unwrap();
    let names: Vec<_> = versions.items.iter().map(|version| version.document.version.clone()).collect();
    assert_eq!(names, vec!["2023-07-31", "2024-01-31"]);
}

#[tokio::test]
async fn test_extension_branches_follow_the_extended_version() {
    let context = context();
    create(&context, code_system("SNOMEDCT", "snomed")).await.unwrap();

    let uri = ResourceURI::new(ResourceType::CodeSystem, "SNOMEDCT");
    VersionCreateRequestBuilder::new(uri.clone(), "2024-01-31", NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
        .commit()
        .build(RESOURCES_REPOSITORY, MAIN_PATH)
        .execute(&context)
        .await
        .unwrap();

    let unversioned = create(&context, code_system("SNOMEDCT-SE", "snomed").set_extension_of(uri.clone()))
        .await
        .unwrap_err();
    assert!(matches!(unversioned, ApiError::BadRequest(_)));

    create(
        &context,
        code_system("SNOMEDCT-SE", "snomed").set_extension_of(uri.with_path("2024-01-31")),
    )
    .await
    .unwrap();
    let extension = get(&context, "SNOMEDCT-SE").await.unwrap();
    assert_eq!(
        extension.document.branch_path.as_deref(),
        Some("MAIN/SNOMEDCT/2024-01-31/SNOMEDCT-SE")
    );
}

#[tokio::test]
async fn test_delete_rules() {
    let context = context();

    create(&context, bundle("A", ROOT_ID)).await.unwrap();
    create(&context, code_system("SNOMEDCT", "snomed").set_bundle_id("A")).await.unwrap();
    VersionCreateRequestBuilder::new(
        ResourceURI::new(ResourceType::CodeSystem, "SNOMEDCT"),
        "v1",
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    )
    .commit()
    .build(RESOURCES_REPOSITORY, MAIN_PATH)
    .execute(&context)
    .await
    .unwrap();

    let delete = |id: &str, force: bool| {
        DeleteRequestBuilder::<ResourceDocument>::new(id)
            .force(force)
            .commit()
            .commit_comment(format!("Delete {}", id))
            .build(RESOURCES_REPOSITORY, MAIN_PATH)
    };

    let non_empty_bundle = delete("A", true).execute(&context).await.unwrap_err();
    assert!(matches!(non_empty_bundle, ApiError::Conflict(_)));

    let versioned = delete("SNOMEDCT", false).execute(&context).await.unwrap_err();
    assert!(matches!(versioned, ApiError::Conflict(_)));

    delete("SNOMEDCT", true).execute(&context).await.unwrap();
    assert!(matches!(get(&context, "SNOMEDCT").await, Err(ApiError::NotFound { .. })));

    let versions = RepositoryRequest::new(
        RESOURCES_REPOSITORY,
        BranchRequest::new(MAIN_PATH, VersionSearchRequestBuilder::new().build()),
    )
    .execute(&context)
    .await
    .unwrap();
    assert_eq!(versions.total, 0);

    delete("A", false).execute(&context).await.unwrap();
    let missing = delete("A", false).execute(&context).await.unwrap_err();
    assert!(matches!(missing, ApiError::NotFound { .. }));
}

#[tokio::test]
async fn test_restricted_users_see_permitted_subtrees() {
    let context = context();

    create(&context, bundle("A", ROOT_ID)).await.unwrap();
    create(&context, bundle("B", "A")).await.unwrap();
    create(&context, code_system("SNOMEDCT", "snomed").set_bundle_id("B")).await.unwrap();
    create(&context, bundle("E", ROOT_ID)).await.unwrap();

    let reader = context.with_user(UserContext::new("reader".to_string()).with_permissions(vec!["A".to_string()]));

    let visible = RepositoryRequest::new(
        RESOURCES_REPOSITORY,
        BranchRequest::new(MAIN_PATH, ResourceSearchRequestBuilder::new().build()),
    )
    .execute(&reader)
    .await
    .unwrap();
    let mut visible_ids: Vec<_> = visible.items.iter().map(|resource| resource.id().to_string()).collect();
    visible_ids.sort();
    assert_eq!(visible_ids, vec!["A", "B", "SNOMEDCT"]);

    assert!(matches!(get(&reader, "E").await, Err(ApiError::NotFound { .. })));

    let nobody = context.with_user(UserContext::new("nobody".to_string()).with_permissions(Vec::new()));
    let nothing = RepositoryRequest::new(
        RESOURCES_REPOSITORY,
        BranchRequest::new(MAIN_PATH, ResourceSearchRequestBuilder::new().build()),
    )
    .execute(&nobody)
    .await
    .unwrap();
    assert_eq!(nothing.total, 0);
}

fn concept(id: &str, parents: &[&str], ancestors: &[&str]) -> ConceptDocument {
    ConceptDocument {
        id: id.to_string(),
        active: true,
        term: format!("Concept {}", id),
        parents: ids(parents),
        ancestors: ids(ancestors),
        ..Default::default()
    }
}

async fn import(context: &ServiceContext, code_system: &ResourceURI, concepts: Vec<ConceptDocument>) {
    let result = TerminologyResourceRequest::new(code_system.clone(), ImportRequest::new(concepts, "Import concepts"))
        .execute(context)
        .await
        .unwrap();
    assert!(result.is_committed());
}

#[tokio::test]
async fn test_concept_search_across_code_systems() {
    let context = context();
    create(&context, code_system("SNOMEDCT", "snomed")).await.unwrap();
    create(&context, code_system("LCS1", "lcs")).await.unwrap();

    let snomed = ResourceURI::new(ResourceType::CodeSystem, "SNOMEDCT");
    let lcs = ResourceURI::new(ResourceType::CodeSystem, "LCS1");
    import(
        &context,
        &snomed,
        vec![concept("1", &[], &[]), concept("2", &["1"], &[]), concept("3", &["2"], &["1"])],
    )
    .await;
    import(&context, &lcs, vec![concept("a", &[], &[]), concept("b", &["a"], &[])]).await;

    let both = ConceptSearchRequestBuilder::new()
        .filter_by_code_systems(vec![snomed.clone(), lcs.clone()])
        .build()
        .execute(&context)
        .await
        .unwrap();
    assert_eq!(both.total, 5);
    assert!(both.search_after.is_none());

    let cursor_across = ConceptSearchRequestBuilder::new()
        .filter_by_code_systems(vec![snomed.clone(), lcs.clone()])
        .set_search_after(Some("cursor".to_string()))
        .build()
        .execute(&context)
        .await
        .unwrap_err();
    assert!(matches!(cursor_across, ApiError::BadRequest(ref message) if message.contains("searchAfter")));

    let first = ConceptSearchRequestBuilder::new()
        .filter_by_code_system(snomed.clone())
        .set_limit(2)
        .build()
        .execute(&context)
        .await
        .unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first.total, 3);
    let second = ConceptSearchRequestBuilder::new()
        .filter_by_code_system(snomed.clone())
        .set_limit(2)
        .set_search_after(first.search_after.clone())
        .build()
        .execute(&context)
        .await
        .unwrap();
    assert_eq!(second.items.iter().map(|concept| concept.id.as_str()).collect::<Vec<_>>(), vec!["3"]);

    let below_root = ConceptSearchRequestBuilder::new()
        .filter_by_code_system(snomed.clone())
        .filter_by_ancestor("1")
        .build()
        .execute(&context)
        .await
        .unwrap();
    let mut below: Vec<_> = below_root.items.iter().map(|concept| concept.id.clone()).collect();
    below.sort();
    assert_eq!(below, vec!["2", "3"]);

    let not_a_code_system = ConceptSearchRequestBuilder::new()
        .filter_by_code_system(ResourceURI::new(ResourceType::ValueSet, "VS"))
        .build()
        .execute(&context)
        .await
        .unwrap_err();
    assert!(matches!(not_a_code_system, ApiError::BadRequest(_)));
}

async fn descendant_ids(context: &ServiceContext, code_system: &ResourceURI, direct: bool) -> Vec<Id> {
    let found = ConceptSearchRequestBuilder::new()
        .filter_by_code_system(code_system.clone())
        .filter_by_id("1")
        .set_expand(format!("descendants(direct:{})", direct))
        .build()
        .execute(context)
        .await
        .unwrap();
    assert_eq!(found.total, 1);
    let descendants = found.items[0].descendants.clone().unwrap();
    descendants.items.iter().map(|concept| concept.id.clone()).collect()
}

#[tokio::test]
async fn test_concept_descendants_expansion() {
    let context = context();
    create(&context, code_system("SNOMEDCT", "snomed")).await.unwrap();
    let snomed = ResourceURI::new(ResourceType::CodeSystem, "SNOMEDCT");
    import(
        &context,
        &snomed,
        vec![concept("1", &[], &[]), concept("2", &["1"], &[]), concept("3", &["2"], &["1"])],
    )
    .await;

    assert_eq!(descendant_ids(&context, &snomed, true).await, ids(&["2"]));
    assert_eq!(descendant_ids(&context, &snomed, false).await, ids(&["2", "3"]));
}

#[tokio::test]
async fn test_commit_builder_author_defaults_to_user() {
    let context = context();

    let result = CommitRequestBuilder::new(bundle("A", ROOT_ID).build())
        .build(RESOURCES_REPOSITORY, MAIN_PATH)
        .execute(&context)
        .await
        .unwrap();
    assert!(result.is_committed());

    let unknown_repository = CommitRequestBuilder::new(bundle("B", ROOT_ID).build())
        .build("unknown", MAIN_PATH)
        .execute(&context)
        .await
        .unwrap_err();
    assert!(matches!(unknown_repository, ApiError::NotFound { .. }));
}
