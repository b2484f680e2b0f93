//! Integration tests for matrix filters, their spaces and node assignments
//!
//! Tests cover:
//! - Range spaces and inline assignments
//! - Color spaces, edits and removals flowing into children caches
//! - Assignment rules (ownership, multiple values, duplicates)
//! - Taxon filters derived from node taxa
//! - Filter deletion leaving caches stale until rebuild

use anyhow::Result;
use naturekey_core::db::MemoryStore;
use naturekey_core::operations::{
    FilterSpaceParams, InsertNodeParams, MatrixFilterParams, MatrixFilterUpdate,
    NodeSpaceAssignment,
};
use naturekey_core::{
    drifted_parents, ColorFilterBehavior, EncodedSpace, FilterDefinition, FilterParameters,
    GuideConfig, KeyServiceError, MatrixFilterType, NatureGuideService, NodeId, NodeTaxon,
    NodeType, Rgba, SpaceInput, StaticTaxonomySource, TreeNode,
};
use serde_json::json;
use std::sync::Arc;

const COL: &str = "taxonomy.sources.col";

async fn create_service() -> Result<NatureGuideService> {
    Ok(NatureGuideService::in_memory(GuideConfig::new(3, "Wild flowers")).await?)
}

async fn insert(
    service: &NatureGuideService,
    parent_id: NodeId,
    node_type: NodeType,
    name: &str,
) -> Result<TreeNode> {
    Ok(service
        .insert_node(InsertNodeParams::new(parent_id, node_type, name))
        .await?)
}

fn multiple_values() -> FilterDefinition {
    FilterDefinition {
        allow_multiple_values: true,
        parameters: FilterParameters::Plain,
    }
}

fn hex(value: &str) -> FilterSpaceParams {
    FilterSpaceParams::new(SpaceInput::Hex(value.to_string()))
}

#[tokio::test]
async fn test_range_filter_inline_assignment() -> Result<()> {
    let service = create_service().await?;
    let root = service.root().await?;
    let a = insert(&service, root.id, NodeType::Result, "A").await?;

    let filter = service
        .create_matrix_filter(MatrixFilterParams::new(root.id, MatrixFilterType::Range, "Petal length"))
        .await?;
    assert_eq!(service.filter_encoded_space(filter.uuid).await?, json!([0, 0]));

    service
        .assign_node_filter_space(a.id, filter.uuid, NodeSpaceAssignment::Inline(json!([1.5, 4])))
        .await?;

    let nfs = service.node_filter_space(a.id, filter.uuid).await.unwrap();
    assert_eq!(nfs.encoded_space, Some(EncodedSpace::Range { min: 1.5, max: 4.0 }));
    assert!(nfs.values.is_empty());

    let cache = service.children_cache(root.id).await.unwrap();
    let item = cache.item(&a.name_uuid).unwrap();
    assert_eq!(item.space[&filter.uuid_key()], vec![json!(1.5), json!(4.0)]);

    service
        .set_filter_space(filter.uuid, SpaceInput::Range { min: 0.5, max: 10.0 })
        .await?;
    assert_eq!(service.filter_encoded_space(filter.uuid).await?, json!([0.5, 10.0]));
    Ok(())
}

#[tokio::test]
async fn test_range_filter_rejects_bad_input() -> Result<()> {
    let service = create_service().await?;
    let root = service.root().await?;
    let a = insert(&service, root.id, NodeType::Result, "A").await?;
    let filter = service
        .create_matrix_filter(MatrixFilterParams::new(root.id, MatrixFilterType::Range, "Height"))
        .await?;

    let reversed = service
        .assign_node_filter_space(a.id, filter.uuid, NodeSpaceAssignment::Inline(json!([5, 1])))
        .await;
    assert!(matches!(reversed, Err(KeyServiceError::InvalidEncodedSpace(_))));

    let by_reference = service
        .assign_node_filter_space(a.id, filter.uuid, NodeSpaceAssignment::Values(vec![]))
        .await;
    assert!(matches!(by_reference, Err(KeyServiceError::ValidationFailed(_))));

    // range filters have a single space
    let added = service
        .add_filter_space(filter.uuid, FilterSpaceParams::new(SpaceInput::Range { min: 1.0, max: 2.0 }))
        .await;
    assert!(added.is_err());

    assert!(service.node_filter_space(a.id, filter.uuid).await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_number_assignment_is_sorted() -> Result<()> {
    let service = create_service().await?;
    let root = service.root().await?;
    let a = insert(&service, root.id, NodeType::Result, "A").await?;
    let filter = service
        .create_matrix_filter(MatrixFilterParams::new(root.id, MatrixFilterType::Number, "Petals"))
        .await?;

    service
        .set_filter_space(filter.uuid, SpaceInput::Numbers(vec![3.0, 4.0, 5.0]))
        .await?;
    let nfs = service
        .assign_node_filter_space(a.id, filter.uuid, NodeSpaceAssignment::Inline(json!([5, 4])))
        .await?;

    assert_eq!(nfs.encoded_space, Some(EncodedSpace::Numbers(vec![4.0, 5.0])));
    Ok(())
}

#[test]
fn test_hex_colors_round_trip() {
    let red = ColorFilterBehavior::encode_from_hex("#ff0000").unwrap();
    assert_eq!(red, Rgba::new(255, 0, 0, 1.0));
    assert_eq!(ColorFilterBehavior::to_hex(&red), "#ff0000ff");

    for alpha in 0..=100u8 {
        let rgba = Rgba::new(12, 200, 99, alpha as f64 / 100.0);
        let hex = ColorFilterBehavior::to_hex(&rgba);
        assert_eq!(ColorFilterBehavior::encode_from_hex(&hex).unwrap(), rgba, "{}", hex);
    }

    assert!(ColorFilterBehavior::encode_from_hex("ff0000").is_err());
    assert!(ColorFilterBehavior::encode_from_hex("#ff00").is_err());
}

#[tokio::test]
async fn test_color_space_edits_follow_into_cache() -> Result<()> {
    let service = create_service().await?;
    let root = service.root().await?;
    let a = insert(&service, root.id, NodeType::Result, "A").await?;
    let b = insert(&service, root.id, NodeType::Result, "B").await?;

    let filter = service
        .create_matrix_filter(
            MatrixFilterParams::new(root.id, MatrixFilterType::Color, "Flower color")
                .with_definition(multiple_values()),
        )
        .await?;
    let red = service
        .add_filter_space(filter.uuid, hex("#ff0000").with_description("red"))
        .await?;
    let blue = service.add_filter_space(filter.uuid, hex("#0000ff80")).await?;
    assert_eq!(blue.encoded_space, EncodedSpace::Color(Rgba::new(0, 0, 255, 0.5)));

    service
        .assign_node_filter_space(a.id, filter.uuid, NodeSpaceAssignment::Values(vec![red.id, blue.id]))
        .await?;
    service
        .assign_node_filter_space(b.id, filter.uuid, NodeSpaceAssignment::Values(vec![red.id]))
        .await?;

    let key = filter.uuid_key();
    let cache = service.children_cache(root.id).await.unwrap();
    assert_eq!(
        cache.item(&a.name_uuid).unwrap().space[&key],
        vec![json!([255, 0, 0, 1.0]), json!([0, 0, 255, 0.5])]
    );

    // editing a declared color repoints every child carrying it
    service.update_filter_space(red.id, hex("#cc0000")).await?;
    let cache = service.children_cache(root.id).await.unwrap();
    assert_eq!(cache.item(&b.name_uuid).unwrap().space[&key], vec![json!([204, 0, 0, 1.0])]);
    assert_eq!(cache, service.computed_children_cache(root.id).await);

    service.remove_filter_space(blue.id).await?;
    let cache = service.children_cache(root.id).await.unwrap();
    assert_eq!(cache.item(&a.name_uuid).unwrap().space[&key], vec![json!([204, 0, 0, 1.0])]);

    // the last value goes, and the assignments with it
    service.remove_filter_space(red.id).await?;
    assert!(service.node_filter_space(a.id, filter.uuid).await.is_none());
    assert!(service.node_filter_space(b.id, filter.uuid).await.is_none());
    let cache = service.children_cache(root.id).await.unwrap();
    assert!(!cache.item(&a.name_uuid).unwrap().space.contains_key(&key));
    assert!(drifted_parents(&service.snapshot().await).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_space_values_are_rejected() -> Result<()> {
    let service = create_service().await?;
    let root = service.root().await?;
    let filter = service
        .create_matrix_filter(MatrixFilterParams::new(root.id, MatrixFilterType::Color, "Color"))
        .await?;

    service.add_filter_space(filter.uuid, hex("#ff0000")).await?;
    let same = service.add_filter_space(filter.uuid, hex("#FF0000")).await;
    assert!(matches!(same, Err(KeyServiceError::ValidationFailed(_))));

    let green = service.add_filter_space(filter.uuid, hex("#00ff00")).await?;
    assert!(service.update_filter_space(green.id, hex("#ff0000ff")).await.is_err());
    assert_eq!(service.filter_spaces(filter.uuid).await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_assignment_rules() -> Result<()> {
    let service = create_service().await?;
    let root = service.root().await?;
    let group = insert(&service, root.id, NodeType::Node, "Group").await?;
    let leaf = insert(&service, group.id, NodeType::Result, "Leaf").await?;

    let texture = service
        .create_matrix_filter(MatrixFilterParams::new(
            root.id,
            MatrixFilterType::DescriptiveTextAndImages,
            "Texture",
        ))
        .await?;
    let smooth = service
        .add_filter_space(texture.uuid, FilterSpaceParams::new(SpaceInput::Text("Smooth".into())))
        .await?;
    let rough = service
        .add_filter_space(texture.uuid, FilterSpaceParams::new(SpaceInput::Text("Rough".into())))
        .await?;
    let other = service
        .create_matrix_filter(MatrixFilterParams::new(root.id, MatrixFilterType::TextOnly, "Habitat"))
        .await?;
    let forest = service
        .add_filter_space(other.uuid, FilterSpaceParams::new(SpaceInput::Text("Forest".into())))
        .await?;

    // only children of the filter's node carry values
    let err = service
        .assign_node_filter_space(leaf.id, texture.uuid, NodeSpaceAssignment::Values(vec![smooth.id]))
        .await
        .unwrap_err();
    assert!(err.is_hierarchy_violation());

    let two = service
        .assign_node_filter_space(group.id, texture.uuid, NodeSpaceAssignment::Values(vec![smooth.id, rough.id]))
        .await;
    assert!(two.is_err());

    let foreign = service
        .assign_node_filter_space(group.id, texture.uuid, NodeSpaceAssignment::Values(vec![forest.id]))
        .await;
    assert!(foreign.is_err());

    let inline = service
        .assign_node_filter_space(group.id, texture.uuid, NodeSpaceAssignment::Inline(json!("Smooth")))
        .await;
    assert!(inline.is_err());

    service
        .assign_node_filter_space(group.id, texture.uuid, NodeSpaceAssignment::Values(vec![rough.id]))
        .await?;
    assert!(service.remove_node_filter_space(group.id, texture.uuid).await?);
    assert!(!service.remove_node_filter_space(group.id, texture.uuid).await?);

    // filters only go on nodes that can have children
    let on_result = service
        .create_matrix_filter(MatrixFilterParams::new(leaf.id, MatrixFilterType::Color, "Color"))
        .await;
    assert!(on_result.unwrap_err().is_hierarchy_violation());
    Ok(())
}

#[tokio::test]
async fn test_update_matrix_filter_checks_name_and_weight() -> Result<()> {
    let service = create_service().await?;
    let root = service.root().await?;
    let leaves = service
        .create_matrix_filter(MatrixFilterParams::new(root.id, MatrixFilterType::TextOnly, "Leaves"))
        .await?;
    service
        .create_matrix_filter(MatrixFilterParams::new(root.id, MatrixFilterType::TextOnly, "Stem"))
        .await?;

    let renamed = service
        .update_matrix_filter(
            leaves.uuid,
            MatrixFilterUpdate {
                name: Some("Leaf shape".into()),
                weight: Some(80),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(renamed.name, "Leaf shape");
    assert_eq!(renamed.weight, 80);
    assert_eq!(renamed.filter_type, MatrixFilterType::TextOnly);

    let taken = service
        .update_matrix_filter(
            leaves.uuid,
            MatrixFilterUpdate {
                name: Some("Stem".into()),
                ..Default::default()
            },
        )
        .await;
    assert!(taken.is_err());

    let heavy = service
        .update_matrix_filter(
            leaves.uuid,
            MatrixFilterUpdate {
                weight: Some(101),
                ..Default::default()
            },
        )
        .await;
    assert!(heavy.is_err());
    Ok(())
}

#[tokio::test]
async fn test_taxon_filter_values_follow_node_taxa() -> Result<()> {
    let coleoptera = NodeTaxon::new(COL, "Coleoptera", None, "uuid-coleoptera", "001002003");
    let carabus = NodeTaxon::new(
        COL,
        "Carabus nemoralis",
        Some("Müller, 1764".into()),
        "uuid-carabus",
        "001002003004005",
    );
    let service = NatureGuideService::open(
        GuideConfig::new(4, "Beetles"),
        Arc::new(MemoryStore::new()),
        Arc::new(StaticTaxonomySource::from_taxa([coleoptera.clone()])),
    )
    .await?;
    let root = service.root().await?;

    let beetle = service
        .insert_node(
            InsertNodeParams::new(root.id, NodeType::Result, "Ground beetle").with_taxon(carabus.clone()),
        )
        .await?;
    let unknown = insert(&service, root.id, NodeType::Result, "Unknown").await?;

    let filter = service
        .create_matrix_filter(MatrixFilterParams::new(root.id, MatrixFilterType::Taxon, "Group"))
        .await?;
    service
        .set_filter_space(
            filter.uuid,
            SpaceInput::Taxa {
                latnames: vec!["Coleoptera".into()],
                custom: None,
            },
        )
        .await?;

    // values come from taxa, never from assignments
    let assigned = service
        .assign_node_filter_space(beetle.id, filter.uuid, NodeSpaceAssignment::Values(vec![]))
        .await;
    assert!(matches!(assigned, Err(KeyServiceError::ValidationFailed(_))));

    let traits = service.collect_traits(beetle.id).await;
    assert_eq!(traits.len(), 1);
    assert_eq!(traits[0].filter_type, MatrixFilterType::Taxon);
    assert_eq!(traits[0].display, vec!["Coleoptera".to_string()]);
    assert!(service.collect_traits(unknown.id).await.is_empty());

    let release = service.build_release().await?;
    let children = release["tree"][root.name_uuid.to_string()]["children"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    let key = filter.uuid_key();
    let beetle_json = children.iter().find(|c| c["id"] == json!(beetle.id)).unwrap();
    assert_eq!(beetle_json["space"][&key][0]["latname"], json!("Coleoptera"));
    let unknown_json = children.iter().find(|c| c["id"] == json!(unknown.id)).unwrap();
    assert!(unknown_json["space"].get(&key).is_none());
    assert_eq!(unknown_json["taxon"]["taxon_source"], json!(service.config().guide_taxon_source));
    Ok(())
}

#[tokio::test]
async fn test_deleted_filter_leaves_cache_stale_until_rebuild() -> Result<()> {
    let service = create_service().await?;
    let root = service.root().await?;
    let a = insert(&service, root.id, NodeType::Result, "A").await?;

    let filter = service
        .create_matrix_filter(MatrixFilterParams::new(root.id, MatrixFilterType::Color, "Color"))
        .await?;
    let red = service.add_filter_space(filter.uuid, hex("#ff0000")).await?;
    service
        .assign_node_filter_space(a.id, filter.uuid, NodeSpaceAssignment::Values(vec![red.id]))
        .await?;

    service.delete_matrix_filter(filter.uuid).await?;

    assert!(service.matrix_filters(root.id).await.is_empty());
    assert!(service.filter_spaces(filter.uuid).await.is_empty());
    assert!(service.node_filter_space(a.id, filter.uuid).await.is_none());

    let cache = service.children_cache(root.id).await.unwrap();
    assert!(cache.item(&a.name_uuid).unwrap().space.contains_key(&filter.uuid_key()));
    assert!(!cache.matrix_filter_types.contains_key(&filter.uuid_key()));
    assert_eq!(drifted_parents(&service.snapshot().await), vec![root.id]);

    let drifted = service.rebuild_all_children_caches().await?;
    assert_eq!(drifted, vec![root.id]);
    let cache = service.children_cache(root.id).await.unwrap();
    assert!(cache.item(&a.name_uuid).unwrap().space.is_empty());
    assert!(drifted_parents(&service.snapshot().await).is_empty());
    Ok(())
}
