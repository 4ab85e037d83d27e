//! Table-level request generation.
//!
//! Builds the create-table request for a set of schemas and computes the
//! differences between the expected table and a described one.

use crate::request::{
    AttributeDefinition, BillingMode, CreateGlobalSecondaryIndexAction, CreateTableInput,
    DeleteGlobalSecondaryIndexAction, GlobalSecondaryIndex, GlobalSecondaryIndexDescription,
    GlobalSecondaryIndexUpdate, KeySchemaElement, KeyType, LocalSecondaryIndex, Projection,
    ProjectionType, ProvisionedThroughput, ScalarAttributeType, TableDescription,
    UpdateTableInput,
};
use crate::schema::{IndexKind, IndexProjection, IndexSpec, Schema, Throughput};
use crate::wire::WireType;
use crate::{error::Result, Error};

/// Check that all schemas agree on their key attributes.
pub fn check_key_agreement(schemas: &[Schema]) -> Result<()> {
    let first = schemas
        .first()
        .ok_or_else(|| Error::MissingSchema("model has no schema".into()))?;
    for schema in &schemas[1..] {
        if schema.hash_key() != first.hash_key() {
            return Err(Error::InvalidParameter(
                "hashKey's for all schema's must match.".into(),
            ));
        }
        if schema.range_key() != first.range_key() {
            return Err(Error::InvalidParameter(
                "rangeKey's for all schema's must match.".into(),
            ));
        }
    }
    Ok(())
}

fn key_schema(hash_key: &str, range_key: Option<&str>) -> Vec<KeySchemaElement> {
    let mut elements = vec![KeySchemaElement {
        attribute_name: hash_key.to_string(),
        key_type: KeyType::Hash,
    }];
    if let Some(range_key) = range_key {
        elements.push(KeySchemaElement {
            attribute_name: range_key.to_string(),
            key_type: KeyType::Range,
        });
    }
    elements
}

fn projection(projection: &IndexProjection) -> Projection {
    match projection {
        IndexProjection::All => Projection {
            projection_type: Some(ProjectionType::All),
            non_key_attributes: Vec::new(),
        },
        IndexProjection::KeysOnly => Projection {
            projection_type: Some(ProjectionType::KeysOnly),
            non_key_attributes: Vec::new(),
        },
        IndexProjection::Include(attributes) => Projection {
            projection_type: Some(ProjectionType::Include),
            non_key_attributes: attributes.clone(),
        },
    }
}

fn provisioned(throughput: Throughput) -> Option<ProvisionedThroughput> {
    match throughput {
        Throughput::OnDemand => None,
        Throughput::Provisioned { read, write } => Some(ProvisionedThroughput {
            read_capacity_units: read,
            write_capacity_units: write,
        }),
    }
}

fn scalar_type(schema: &Schema, name: &str) -> Result<ScalarAttributeType> {
    match schema.key_wire_type(name)? {
        WireType::S => Ok(ScalarAttributeType::S),
        WireType::N => Ok(ScalarAttributeType::N),
        _ => Ok(ScalarAttributeType::B),
    }
}

/// Indexes across all schemas, first declaration of a name wins.
pub fn index_specs(schemas: &[Schema]) -> Vec<IndexSpec> {
    let mut specs: Vec<IndexSpec> = Vec::new();
    for spec in schemas.iter().flat_map(Schema::indexes) {
        if !specs.iter().any(|s| s.name == spec.name) {
            specs.push(spec);
        }
    }
    specs
}

/// Attribute definitions for the table keys and every index key.
pub fn attribute_definitions(schemas: &[Schema]) -> Result<Vec<AttributeDefinition>> {
    let first = schemas
        .first()
        .ok_or_else(|| Error::MissingSchema("model has no schema".into()))?;
    let mut names: Vec<String> = vec![first.hash_key().to_string()];
    names.extend(first.range_key().map(str::to_string));
    for spec in index_specs(schemas) {
        names.push(spec.hash_key);
        names.extend(spec.range_key);
    }

    let mut definitions: Vec<AttributeDefinition> = Vec::new();
    for name in names {
        if definitions.iter().any(|d| d.attribute_name == name) {
            continue;
        }
        let schema = schemas
            .iter()
            .find(|s| s.contains(&name))
            .ok_or_else(|| {
                Error::InvalidParameter(format!("index key {} is not declared", name))
            })?;
        definitions.push(AttributeDefinition {
            attribute_type: scalar_type(schema, &name)?,
            attribute_name: name,
        });
    }
    Ok(definitions)
}

/// Global indexes as they appear in a create-table request.
pub fn global_indexes(schemas: &[Schema], throughput: Throughput) -> Vec<GlobalSecondaryIndex> {
    index_specs(schemas)
        .into_iter()
        .filter(|spec| spec.kind == IndexKind::Global)
        .map(|spec| GlobalSecondaryIndex {
            key_schema: key_schema(&spec.hash_key, spec.range_key.as_deref()),
            projection: projection(&spec.projection),
            provisioned_throughput: match throughput {
                Throughput::OnDemand => None,
                table => provisioned(spec.throughput.unwrap_or(table)),
            },
            index_name: spec.name,
        })
        .collect()
}

fn local_indexes(schemas: &[Schema]) -> Vec<LocalSecondaryIndex> {
    index_specs(schemas)
        .into_iter()
        .filter(|spec| spec.kind == IndexKind::Local)
        .map(|spec| LocalSecondaryIndex {
            key_schema: key_schema(&spec.hash_key, spec.range_key.as_deref()),
            projection: projection(&spec.projection),
            index_name: spec.name,
        })
        .collect()
}

/// The create-table request for a model.
pub fn create_table_input(
    table_name: &str,
    schemas: &[Schema],
    throughput: Throughput,
) -> Result<CreateTableInput> {
    check_key_agreement(schemas)?;
    let first = &schemas[0];
    let global = global_indexes(schemas, throughput);
    let local = local_indexes(schemas);
    Ok(CreateTableInput {
        table_name: table_name.to_string(),
        attribute_definitions: attribute_definitions(schemas)?,
        key_schema: key_schema(first.hash_key(), first.range_key()),
        billing_mode: matches!(throughput, Throughput::OnDemand).then_some(BillingMode::PayPerRequest),
        provisioned_throughput: provisioned(throughput),
        global_secondary_indexes: (!global.is_empty()).then_some(global),
        local_secondary_indexes: (!local.is_empty()).then_some(local),
    })
}

/// Whether the described table already has the expected throughput.
///
/// Billing modes must match and, when provisioned, so must both capacities.
pub fn throughput_up_to_date(expected: Throughput, table: &TableDescription) -> bool {
    let billing_mode = table
        .billing_mode_summary
        .as_ref()
        .and_then(|s| s.billing_mode)
        .unwrap_or(BillingMode::Provisioned);
    match expected {
        Throughput::OnDemand => billing_mode == BillingMode::PayPerRequest,
        Throughput::Provisioned { read, write } => {
            billing_mode == BillingMode::Provisioned
                && table.provisioned_throughput.is_some_and(|pt| {
                    pt.read_capacity_units == read && pt.write_capacity_units == write
                })
        }
    }
}

/// Update-table request bringing throughput in line, if it drifted.
pub fn throughput_update(
    table_name: &str,
    expected: Throughput,
    table: &TableDescription,
) -> Option<UpdateTableInput> {
    if throughput_up_to_date(expected, table) {
        return None;
    }
    Some(UpdateTableInput {
        table_name: table_name.to_string(),
        billing_mode: Some(match expected {
            Throughput::OnDemand => BillingMode::PayPerRequest,
            Throughput::Provisioned { .. } => BillingMode::Provisioned,
        }),
        provisioned_throughput: provisioned(expected),
        attribute_definitions: Vec::new(),
        global_secondary_index_updates: Vec::new(),
    })
}

/// One global index difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexChange {
    Delete(String),
    Add(GlobalSecondaryIndex),
}

fn same_index(expected: &GlobalSecondaryIndex, existing: &GlobalSecondaryIndexDescription) -> bool {
    expected.index_name == existing.index_name
        && (existing.key_schema.is_empty() || expected.key_schema == existing.key_schema)
        && existing
            .projection
            .as_ref()
            .map_or(true, |p| *p == expected.projection)
}

/// Differences between expected and existing global indexes, deletions first.
pub fn index_changes(
    expected: &[GlobalSecondaryIndex],
    existing: &[GlobalSecondaryIndexDescription],
) -> Vec<IndexChange> {
    let deletes = existing
        .iter()
        .filter(|e| !expected.iter().any(|x| same_index(x, e)))
        .map(|e| IndexChange::Delete(e.index_name.clone()));
    let adds = expected
        .iter()
        .filter(|x| !existing.iter().any(|e| same_index(x, e)))
        .map(|x| IndexChange::Add(x.clone()));
    deletes.chain(adds).collect()
}

/// Update-table request applying one index change.
pub fn index_update(
    table_name: &str,
    change: &IndexChange,
    definitions: &[AttributeDefinition],
) -> UpdateTableInput {
    let (attribute_definitions, update) = match change {
        IndexChange::Delete(name) => (
            Vec::new(),
            GlobalSecondaryIndexUpdate {
                create: None,
                delete: Some(DeleteGlobalSecondaryIndexAction {
                    index_name: name.clone(),
                }),
            },
        ),
        IndexChange::Add(index) => (
            definitions.to_vec(),
            GlobalSecondaryIndexUpdate {
                create: Some(CreateGlobalSecondaryIndexAction {
                    index_name: index.index_name.clone(),
                    key_schema: index.key_schema.clone(),
                    projection: index.projection.clone(),
                    provisioned_throughput: index.provisioned_throughput,
                }),
                delete: None,
            },
        ),
    };
    UpdateTableInput {
        table_name: table_name.to_string(),
        billing_mode: None,
        provisioned_throughput: None,
        attribute_definitions,
        global_secondary_index_updates: vec![update],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{BillingModeSummary, TableStatus};
    use crate::schema::{Attribute, IndexDef};
    use crate::types::AttributeType;
    use serde_json::json;

    fn schemas() -> Vec<Schema> {
        vec![Schema::new(vec![
            Attribute::new("id", AttributeType::String),
            Attribute::new("created", AttributeType::Number).range_key(),
            Attribute::new("email", AttributeType::String).index(IndexDef::global()),
            Attribute::new("score", AttributeType::Number).index(IndexDef::local()),
        ])
        .unwrap()]
    }

    fn described(billing: Option<BillingMode>, pt: Option<(u64, u64)>) -> TableDescription {
        TableDescription {
            table_name: "t".into(),
            table_status: TableStatus::Active,
            billing_mode_summary: billing.map(|b| BillingModeSummary {
                billing_mode: Some(b),
            }),
            provisioned_throughput: pt.map(|(r, w)| ProvisionedThroughput {
                read_capacity_units: r,
                write_capacity_units: w,
            }),
            global_secondary_indexes: Vec::new(),
        }
    }

    #[test]
    fn create_table_request() {
        let input = create_table_input("users", &schemas(), Throughput::default()).unwrap();
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["TableName"], json!("users"));
        assert_eq!(
            value["KeySchema"],
            json!([
                {"AttributeName": "id", "KeyType": "HASH"},
                {"AttributeName": "created", "KeyType": "RANGE"}
            ])
        );
        assert_eq!(
            value["AttributeDefinitions"],
            json!([
                {"AttributeName": "id", "AttributeType": "S"},
                {"AttributeName": "created", "AttributeType": "N"},
                {"AttributeName": "email", "AttributeType": "S"},
                {"AttributeName": "score", "AttributeType": "N"}
            ])
        );
        assert_eq!(
            value["ProvisionedThroughput"],
            json!({"ReadCapacityUnits": 1, "WriteCapacityUnits": 1})
        );
        assert_eq!(
            value["GlobalSecondaryIndexes"][0]["IndexName"],
            json!("emailGlobalIndex")
        );
        assert_eq!(
            value["LocalSecondaryIndexes"][0]["KeySchema"][1]["AttributeName"],
            json!("score")
        );
        assert!(value.get("BillingMode").is_none());
    }

    #[test]
    fn on_demand_table() {
        let input = create_table_input("users", &schemas(), Throughput::OnDemand).unwrap();
        assert_eq!(input.billing_mode, Some(BillingMode::PayPerRequest));
        assert!(input.provisioned_throughput.is_none());
        assert!(input.global_secondary_indexes.unwrap()[0]
            .provisioned_throughput
            .is_none());
    }

    #[test]
    fn mismatched_keys_rejected() {
        let mut all = schemas();
        all.push(Schema::new(vec![Attribute::new("other", AttributeType::String)]).unwrap());
        let err = create_table_input("users", &all, Throughput::default()).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidParameter("hashKey's for all schema's must match.".into())
        );
    }

    #[test]
    fn no_schema_is_missing() {
        let err = create_table_input("users", &[], Throughput::default()).unwrap_err();
        assert!(matches!(err, Error::MissingSchema(_)));
    }

    #[test]
    fn throughput_drift() {
        let expected = Throughput::Provisioned { read: 5, write: 5 };
        assert!(throughput_up_to_date(expected, &described(None, Some((5, 5)))));
        // Read matches but write does not
        assert!(!throughput_up_to_date(expected, &described(None, Some((5, 1)))));
        assert!(!throughput_up_to_date(
            expected,
            &described(Some(BillingMode::PayPerRequest), Some((5, 5)))
        ));
        assert!(throughput_up_to_date(
            Throughput::OnDemand,
            &described(Some(BillingMode::PayPerRequest), None)
        ));

        let update = throughput_update("t", expected, &described(None, Some((1, 1)))).unwrap();
        assert_eq!(update.billing_mode, Some(BillingMode::Provisioned));
        assert_eq!(
            update.provisioned_throughput,
            Some(ProvisionedThroughput {
                read_capacity_units: 5,
                write_capacity_units: 5
            })
        );
    }

    #[test]
    fn index_diff() {
        let expected = global_indexes(&schemas(), Throughput::default());
        let existing = vec![GlobalSecondaryIndexDescription {
            index_name: "stale".into(),
            index_status: Some(TableStatus::Active),
            key_schema: Vec::new(),
            projection: None,
            provisioned_throughput: None,
        }];
        let changes = index_changes(&expected, &existing);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0], IndexChange::Delete("stale".into()));
        assert!(matches!(&changes[1], IndexChange::Add(i) if i.index_name == "emailGlobalIndex"));

        let existing = vec![GlobalSecondaryIndexDescription {
            index_name: "emailGlobalIndex".into(),
            index_status: Some(TableStatus::Active),
            key_schema: expected[0].key_schema.clone(),
            projection: Some(expected[0].projection.clone()),
            provisioned_throughput: None,
        }];
        assert!(index_changes(&expected, &existing).is_empty());
    }

    #[test]
    fn index_update_request() {
        let defs = attribute_definitions(&schemas()).unwrap();
        let expected = global_indexes(&schemas(), Throughput::default());
        let input = index_update("t", &IndexChange::Add(expected[0].clone()), &defs);
        assert_eq!(input.attribute_definitions.len(), 4);
        assert!(input.global_secondary_index_updates[0].create.is_some());

        let input = index_update("t", &IndexChange::Delete("x".into()), &defs);
        assert!(input.attribute_definitions.is_empty());
    }
}
