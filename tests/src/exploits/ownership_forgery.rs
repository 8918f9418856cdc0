//! Forged ownership fields on Data record mutations.

#[cfg(test)]
mod tests {
    use crate::fixtures::{data_key, data_record, with, Member, Network};
    use datashare_chaincode::prelude::*;
    use serde_json::json;

    async fn owned_house(network: &Network) -> String {
        network
            .data
            .add_one(
                &network.as_member(&Member::owner()),
                &data_record("house", "B1").to_string(),
            )
            .await
            .unwrap();
        data_key("house", "B1")
    }

    #[tokio::test]
    async fn test_update_with_forged_owner_fields_is_denied() {
        let network = Network::new();
        let key = owned_house(&network).await;
        let attacker = Member::consumer();
        let forged = with(
            data_record("house", "B1"),
            json!({
                "memberIdentity": attacker.id,
                "uploaderIdentity": attacker.id,
                "orgMspId": "Org1MSP",
                "digest": "tampered",
            }),
        );

        let err = network
            .data
            .update_one(&network.as_member(&attacker), &forged.to_string())
            .await
            .unwrap_err();
        assert!(err.is_authorization());
        assert_eq!(network.ledger.get_json(&key).unwrap()["digest"], json!("digest-B1"));
    }

    #[tokio::test]
    async fn test_foreign_org_is_denied_every_mutation() {
        let network = Network::new();
        let key = owned_house(&network).await;
        let ctx = network.as_member(&Member::attacker());
        let writes = network.ledger.write_count();

        let err = network
            .data
            .update_fields(&ctx, &key, r#"["digest"]"#, r#"["tampered"]"#)
            .await
            .unwrap_err();
        assert!(err.is_authorization());
        let err = network.data.delete_one(&ctx, &key).await.unwrap_err();
        assert!(err.is_authorization());
        let err = network
            .data
            .delete_many(&ctx, &json!([key]).to_string())
            .await
            .unwrap_err();
        assert!(err.is_authorization());
        assert_eq!(network.ledger.write_count(), writes);
    }

    #[tokio::test]
    async fn test_patch_cannot_rewrite_variant_or_key() {
        let network = Network::new();
        let key = owned_house(&network).await;
        let ctx = network.as_member(&Member::owner());

        let err = network
            .data
            .update_fields(&ctx, &key, r#"["stateType"]"#, r#"["data_share"]"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ChaincodeError::InvalidField { .. }));

        let patched = network
            .data
            .update_fields(&ctx, &key, r#"["chainKey"]"#, r#"["elsewhere"]"#)
            .await
            .unwrap();
        assert_eq!(patched.chain_key().unwrap(), key);
        assert!(network.ledger.get("elsewhere").is_none());
    }
}
