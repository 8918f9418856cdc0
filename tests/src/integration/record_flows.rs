//! # Record Flows
//!
//! Generic Data record lifecycle through `DataStateContract`: upload,
//! delegated ownership, patching, queries and history.

#[cfg(test)]
mod tests {
    use crate::fixtures::{data_key, data_record, with, Member, Network};
    use datashare_chaincode::adapters::composite_key;
    use datashare_chaincode::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_upload_patch_and_history() {
        let network = Network::new();
        let owner = Member::owner();
        let ctx = network.as_member(&owner);
        let key = data_key("house", "B1");

        let added = network
            .data
            .add_one(&ctx, &data_record("house", "B1").to_string())
            .await
            .unwrap();
        assert_eq!(added.member_identity, owner.id);
        assert_eq!(added.uploader_identity, owner.id);
        assert_eq!(added.org_msp_id, "Org1MSP");
        assert_eq!(added.encrypted_fields, vec!["price".to_string()]);

        let patched = network
            .data
            .update_fields(&ctx, &key, r#"["price","location.city"]"#, r#"["v2","Paris"]"#)
            .await
            .unwrap();
        assert_eq!(patched.extra["price"], json!("v2"));
        // Dotted names are plain top-level keys.
        assert_eq!(patched.extra["location.city"], json!("Paris"));

        let stored = network.ledger.get_json(&key).unwrap();
        assert_eq!(stored["stateType"], json!("data"));
        assert_eq!(stored["chainKey"], json!(key));

        network.data.delete_one(&ctx, &key).await.unwrap();
        let history = network.data.list_history(&ctx, &key).await.unwrap();
        // Deletion markers are not returned.
        assert_eq!(history.count, 2);
        assert_eq!(history.items[1]["price"], json!("v2"));
    }

    #[tokio::test]
    async fn test_delegated_upload() {
        let network = Network::new();
        let (owner, consumer) = (Member::owner(), Member::consumer());
        let key = data_key("house", "B9");
        let delegated = with(
            data_record("house", "B9"),
            json!({"memberIdentity": consumer.id}),
        );
        let added = network
            .data
            .add_one(&network.as_member(&owner), &delegated.to_string())
            .await
            .unwrap();
        assert_eq!(added.member_identity, consumer.id);
        assert_eq!(added.uploader_identity, owner.id);

        // Both the delegated member and the uploader may change it.
        for member in [&consumer, &owner] {
            network
                .data
                .update_fields(&network.as_member(member), &key, r#"["note"]"#, r#"["ok"]"#)
                .await
                .unwrap();
        }
        let third = Member::new("0C0C0C", "Org1MSP");
        let err = network
            .data
            .update_fields(&network.as_member(&third), &key, r#"["note"]"#, r#"["no"]"#)
            .await
            .unwrap_err();
        assert!(err.is_authorization());
    }

    #[tokio::test]
    async fn test_queries() {
        let network = Network::new();
        let ctx = network.as_member(&Member::owner());
        let batch = json!([
            data_record("house", "B1"),
            data_record("house", "B2"),
            data_record("car", "C1"),
        ]);
        let added = network.data.add_many(&ctx, &batch.to_string()).await.unwrap();
        let keys: Vec<String> = added.iter().map(|r| r.chain_key().unwrap()).collect();
        assert_eq!(keys, vec!["P1_house_B1", "P1_house_B2", "P1_car_C1"]);

        let houses = network
            .data
            .list_by_query(&ctx, r#"{"selector":{"dataType":"house"}}"#, "", "")
            .await
            .unwrap();
        assert_eq!(houses.count, 2);
        let metadata = houses.pagination_metadata.unwrap();
        assert_eq!(metadata.fetched_records_count, 2);

        let err = network
            .data
            .list_by_query(&ctx, r#"{"dataType":"house"}"#, "", "")
            .await
            .unwrap_err();
        assert!(matches!(err, ChaincodeError::Validation(_)));

        let car = network.data.get_by_business_id(&ctx, "C1").await.unwrap();
        assert_eq!(car.chain_key().unwrap(), "P1_car_C1");
        let err = network.data.get_by_business_id(&ctx, "Z9").await.unwrap_err();
        assert!(matches!(err, ChaincodeError::NotFound(_)));
        assert_eq!(network.ledger.opened_iterators(), network.ledger.closed_iterators());
    }

    #[tokio::test]
    async fn test_list_by_composite_key() {
        let network = Network::new();
        let ctx = network.as_member(&Member::owner());
        let namespace = "platformno~datatype~businessid";
        for id in ["B1", "B2"] {
            let attributes = ["P1".to_string(), "house".to_string(), id.to_string()];
            network.ledger.seed(
                composite_key(namespace, &attributes),
                data_record("house", id).to_string().into_bytes(),
            );
        }
        network.ledger.seed(
            composite_key(namespace, &["P2".to_string(), "house".to_string(), "B3".to_string()]),
            data_record("house", "B3").to_string().into_bytes(),
        );

        let key_object = json!({"objectType": namespace, "objectKeys": ["P1", null, ""]});
        let page = network
            .data
            .list_by_composite_key(&ctx, &key_object.to_string(), "", "")
            .await
            .unwrap();
        assert_eq!(page.count, 2);
        assert_eq!(page.items[0]["businessId"], json!("B1"));
    }

    #[tokio::test]
    async fn test_update_many_is_not_atomic() {
        let network = Network::new();
        let (owner, consumer) = (Member::owner(), Member::consumer());
        network
            .data
            .add_one(&network.as_member(&owner), &data_record("house", "B1").to_string())
            .await
            .unwrap();
        network
            .data
            .add_one(&network.as_member(&consumer), &data_record("house", "B2").to_string())
            .await
            .unwrap();

        let batch = json!([
            with(data_record("house", "B1"), json!({"digest": "new"})),
            with(data_record("house", "B2"), json!({"digest": "new"})),
        ]);
        let err = network
            .data
            .update_many(&network.as_member(&owner), &batch.to_string())
            .await
            .unwrap_err();
        assert!(err.is_authorization());
        // The owner's own record was still rewritten.
        let b1 = network.ledger.get_json(&data_key("house", "B1")).unwrap();
        assert_eq!(b1["digest"], json!("new"));
        let b2 = network.ledger.get_json(&data_key("house", "B2")).unwrap();
        assert_eq!(b2["digest"], json!("digest-B2"));
    }
}
