//! Consent workflow abuse: impersonating proposers or approvers and
//! reviving terminal consents.

#[cfg(test)]
mod tests {
    use crate::fixtures::{
        consent_key, consent_record, data_key, data_record, with, Member, Network,
    };
    use datashare_chaincode::prelude::*;
    use serde_json::json;

    struct Pending {
        network: Network,
        key: String,
        target: String,
    }

    async fn pending_request() -> Pending {
        let network = Network::new();
        let (owner, consumer) = (Member::owner(), Member::consumer());
        network
            .data
            .add_one(
                &network.as_member(&owner),
                &data_record("house", "B1").to_string(),
            )
            .await
            .unwrap();
        let target = data_key("house", "B1");
        network
            .shares
            .request(
                &network.as_member(&consumer),
                &consent_record(&consumer, &owner, &target).to_string(),
            )
            .await
            .unwrap();
        Pending {
            key: consent_key(&consumer, &owner, &target),
            network,
            target,
        }
    }

    fn approval_claiming(approver: &Member, target: &str) -> String {
        with(
            consent_record(&Member::consumer(), approver, target),
            json!({"encryptedKeyForProposer": "attacker-key"}),
        )
        .to_string()
    }

    #[tokio::test]
    async fn test_proposer_cannot_approve_own_request() {
        let Pending { network, key, target } = pending_request().await;
        let consumer = Member::consumer();
        let err = network
            .shares
            .approve(
                &network.as_member(&consumer),
                &key,
                &approval_claiming(&consumer, &target),
            )
            .await
            .unwrap_err();
        assert!(err.is_authorization());
        assert_eq!(network.ledger.get_json(&key).unwrap()["status"], json!("pending"));
    }

    #[tokio::test]
    async fn test_third_party_cannot_reject_or_cancel() {
        let Pending { network, key, .. } = pending_request().await;
        let ctx = network.as_member(&Member::attacker());
        let err = network.shares.reject(&ctx, &key, "now").await.unwrap_err();
        assert!(err.is_authorization());
        let err = network.shares.cancel(&ctx, &key).await.unwrap_err();
        assert!(err.is_authorization());

        // The approver may refuse but not withdraw someone else's request.
        let err = network
            .shares
            .cancel(&network.as_member(&Member::owner()), &key)
            .await
            .unwrap_err();
        assert!(err.is_authorization());
    }

    #[tokio::test]
    async fn test_request_on_behalf_of_another_proposer() {
        let network = Network::new();
        let (owner, consumer, attacker) = (Member::owner(), Member::consumer(), Member::attacker());
        network
            .data
            .add_one(&network.as_member(&owner), &data_record("house", "B1").to_string())
            .await
            .unwrap();
        let err = network
            .shares
            .request(
                &network.as_member(&attacker),
                &consent_record(&consumer, &owner, &data_key("house", "B1")).to_string(),
            )
            .await
            .unwrap_err();
        assert!(err.is_authorization());
    }

    #[tokio::test]
    async fn test_request_naming_wrong_approver_is_a_mismatch() {
        let network = Network::new();
        let (owner, consumer, attacker) = (Member::owner(), Member::consumer(), Member::attacker());
        network
            .data
            .add_one(&network.as_member(&owner), &data_record("house", "B1").to_string())
            .await
            .unwrap();
        let err = network
            .shares
            .request(
                &network.as_member(&consumer),
                &consent_record(&consumer, &attacker, &data_key("house", "B1")).to_string(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChaincodeError::Mismatch(_)));
    }

    #[tokio::test]
    async fn test_share_for_someone_elses_record_is_denied() {
        let network = Network::new();
        let (owner, consumer) = (Member::owner(), Member::consumer());
        let grant = with(
            consent_record(&consumer, &owner, &data_key("house", "B1")),
            json!({"encryptedKeyForProposer": "k"}),
        );
        let err = network
            .shares
            .share(&network.as_member(&consumer), &grant.to_string())
            .await
            .unwrap_err();
        assert!(err.is_authorization());
    }

    #[tokio::test]
    async fn test_request_payload_cannot_preset_status() {
        let network = Network::new();
        let (owner, consumer) = (Member::owner(), Member::consumer());
        network
            .data
            .add_one(&network.as_member(&owner), &data_record("house", "B1").to_string())
            .await
            .unwrap();
        let target = data_key("house", "B1");
        let sneaky = with(
            consent_record(&consumer, &owner, &target),
            json!({"status": "approved", "encryptedKeyForProposer": "self-made"}),
        );
        let requested = network
            .shares
            .request(&network.as_member(&consumer), &sneaky.to_string())
            .await
            .unwrap();
        assert_eq!(requested[0].consent_status().unwrap(), ConsentStatus::Pending);
    }

    #[tokio::test]
    async fn test_approved_consent_is_terminal() {
        let Pending { network, key, target } = pending_request().await;
        let owner = Member::owner();
        let ctx = network.as_member(&owner);
        network
            .shares
            .approve(&ctx, &key, &approval_claiming(&owner, &target))
            .await
            .unwrap();

        let err = network
            .shares
            .approve(&ctx, &key, &approval_claiming(&owner, &target))
            .await
            .unwrap_err();
        assert!(matches!(err, ChaincodeError::InvalidState { .. }));
        let err = network.shares.reject(&ctx, &key, "later").await.unwrap_err();
        assert!(matches!(err, ChaincodeError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_rerequest_cannot_revive_decided_consent() {
        let Pending { network, key, target } = pending_request().await;
        let (owner, consumer) = (Member::owner(), Member::consumer());
        network
            .shares
            .reject(&network.as_member(&owner), &key, "2024-01-01")
            .await
            .unwrap();

        let err = network
            .shares
            .request(
                &network.as_member(&consumer),
                &consent_record(&consumer, &owner, &target).to_string(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChaincodeError::InvalidState { .. }));
        assert_eq!(network.ledger.get_json(&key).unwrap()["status"], json!("rejected"));
    }

    #[tokio::test]
    async fn test_approval_cannot_overwrite_another_consent() {
        let Pending { network, key, target } = pending_request().await;
        let (owner, partner) = (Member::owner(), Member::partner());
        network
            .shares
            .request(
                &network.as_member(&partner),
                &consent_record(&partner, &owner, &target).to_string(),
            )
            .await
            .unwrap();
        let partner_key = consent_key(&partner, &owner, &target);

        // Approving the consumer's request with a payload naming the partner.
        let forged = with(
            consent_record(&partner, &owner, &target),
            json!({"encryptedKeyForProposer": "redirected"}),
        );
        let approved = network
            .shares
            .approve(&network.as_member(&owner), &key, &forged.to_string())
            .await
            .unwrap();
        assert_eq!(approved.chain_key().unwrap(), key);

        let partner_consent = network.ledger.get_json(&partner_key).unwrap();
        assert_eq!(partner_consent["status"], json!("pending"));
        assert!(partner_consent.get("encryptedKeyForProposer").is_none());
    }

    #[tokio::test]
    async fn test_data_contract_cannot_touch_consents() {
        let Pending { network, key, .. } = pending_request().await;
        let ctx = network.as_member(&Member::consumer());

        let err = network
            .data
            .update_fields(&ctx, &key, r#"["status"]"#, r#"["approved"]"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ChaincodeError::InvalidState { .. }));
        let err = network.data.delete_one(&ctx, &key).await.unwrap_err();
        assert!(matches!(err, ChaincodeError::InvalidState { .. }));
        assert_eq!(network.ledger.get_json(&key).unwrap()["status"], json!("pending"));
    }

    #[tokio::test]
    async fn test_generic_mutations_are_closed_on_consents() {
        let Pending { network, key, .. } = pending_request().await;
        let ctx = network.as_member(&Member::consumer());
        let err = DataStateApi::update_one(&network.shares, &ctx, "{}")
            .await
            .unwrap_err();
        assert!(matches!(err, ChaincodeError::Unsupported(_)));
        let err = DataStateApi::delete_one(&network.shares, &ctx, &key)
            .await
            .unwrap_err();
        assert!(matches!(err, ChaincodeError::Unsupported(_)));
        assert!(network.ledger.get(&key).is_some());
    }
}
