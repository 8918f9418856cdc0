//! # Consent Workflow Flows
//!
//! Data owner uploads, consumers request, owner approves or rejects,
//! consumers list what they were granted.
//!
//! ## Flows Tested:
//!
//! 1. **request → approve**: grant lands with the encrypted key, proposer
//!    listing carries the target record
//! 2. **request → reject → cancel**: proposer withdraws a refused request
//! 3. **uploadAndShare**: owner-initiated grants skip `pending`
//! 4. **cross-org**: a partner organization's request is approved by the owner

#[cfg(test)]
mod tests {
    use crate::fixtures::{
        consent_key, consent_record, data_key, data_record, with, Member, Network,
    };
    use datashare_chaincode::prelude::*;
    use futures::future::join_all;
    use serde_json::{json, Value};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    async fn network_with_house() -> Network {
        let network = Network::new();
        network
            .data
            .add_one(
                &network.as_member(&Member::owner()),
                &data_record("house", "B1").to_string(),
            )
            .await
            .expect("owner uploads");
        network
    }

    fn approval(proposer: &Member, owner: &Member, target: &str) -> String {
        with(
            consent_record(proposer, owner, target),
            json!({"encryptedKeyForProposer": "wrapped-key"}),
        )
        .to_string()
    }

    // =============================================================================
    // REQUEST → APPROVE
    // =============================================================================

    #[tokio::test]
    async fn test_request_approve_and_list_for_proposer() {
        let network = network_with_house().await;
        let (owner, consumer) = (Member::owner(), Member::consumer());
        let target = data_key("house", "B1");
        let key = consent_key(&consumer, &owner, &target);

        let requested = network
            .shares
            .request(
                &network.as_member(&consumer),
                &consent_record(&consumer, &owner, &target).to_string(),
            )
            .await
            .expect("request accepted");
        assert_eq!(requested[0].chain_key().unwrap(), key);
        assert_eq!(requested[0].consent_status().unwrap(), ConsentStatus::Pending);

        // Owner sees the pending request for that record.
        let inbox = network
            .shares
            .list_for_approver(&network.as_member(&owner), &owner.id, &target, "", "")
            .await
            .unwrap();
        assert_eq!(inbox.count, 1);
        assert_eq!(inbox.items[0]["status"], json!("pending"));

        let approved = network
            .shares
            .approve(
                &network.as_member(&owner),
                &key,
                &approval(&consumer, &owner, &target),
            )
            .await
            .expect("owner approves");
        assert_eq!(approved.consent_status().unwrap(), ConsentStatus::Approved);
        assert_eq!(approved.member_identity, consumer.id);

        let granted = network
            .shares
            .list_for_proposer(&network.as_member(&consumer), &consumer.id, "", "", "")
            .await
            .unwrap();
        assert_eq!(granted.count, 1);
        let item = &granted.items[0];
        assert_eq!(item["encryptedKeyForProposer"], json!("wrapped-key"));
        assert_eq!(item["data"]["chainKey"], json!(target));
        assert_eq!(item["data"]["memberIdentity"], json!(owner.id));

        let history = network
            .shares
            .list_history(&network.as_member(&consumer), &key)
            .await
            .unwrap();
        let statuses: Vec<&Value> = history.items.iter().map(|doc| &doc["status"]).collect();
        assert_eq!(statuses, vec![&json!("pending"), &json!("approved")]);
    }

    #[tokio::test]
    async fn test_request_for_missing_target_writes_nothing() {
        let network = network_with_house().await;
        let (owner, consumer) = (Member::owner(), Member::consumer());
        let writes = network.ledger.write_count();

        let err = network
            .shares
            .request(
                &network.as_member(&consumer),
                &consent_record(&consumer, &owner, &data_key("house", "B404")).to_string(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChaincodeError::NotFound(_)));
        assert_eq!(network.ledger.write_count(), writes);
    }

    #[tokio::test]
    async fn test_batch_request_fails_as_a_whole_before_writing() {
        let network = network_with_house().await;
        let (owner, consumer) = (Member::owner(), Member::consumer());
        let writes = network.ledger.write_count();
        let payload = json!([
            consent_record(&consumer, &owner, &data_key("house", "B1")),
            consent_record(&consumer, &owner, &data_key("house", "B2")),
        ]);

        let err = network
            .shares
            .request(&network.as_member(&consumer), &payload.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ChaincodeError::NotFound(_)));
        assert_eq!(network.ledger.write_count(), writes);
    }

    // =============================================================================
    // REQUEST → REJECT → CANCEL
    // =============================================================================

    #[tokio::test]
    async fn test_reject_then_cancel() {
        let network = network_with_house().await;
        let (owner, consumer) = (Member::owner(), Member::consumer());
        let target = data_key("house", "B1");
        let key = consent_key(&consumer, &owner, &target);
        network
            .shares
            .request(
                &network.as_member(&consumer),
                &consent_record(&consumer, &owner, &target).to_string(),
            )
            .await
            .unwrap();

        let rejected = network
            .shares
            .reject(&network.as_member(&owner), &key, "2024-03-01T10:00:00Z")
            .await
            .unwrap();
        assert_eq!(rejected.consent_status().unwrap(), ConsentStatus::Rejected);
        let stored = network.ledger.get_json(&key).unwrap();
        assert_eq!(stored["handledTime"], json!("2024-03-01T10:00:00Z"));

        // A refused request stays refused.
        let err = network
            .shares
            .approve(
                &network.as_member(&owner),
                &key,
                &approval(&consumer, &owner, &target),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChaincodeError::InvalidState { .. }));

        let cancelled = network
            .shares
            .cancel(&network.as_member(&consumer), &key)
            .await
            .unwrap();
        assert_eq!(cancelled, key);
        let err = network
            .shares
            .get_by_key(&network.as_member(&consumer), &key)
            .await
            .unwrap_err();
        assert!(matches!(err, ChaincodeError::NotFound(_)));
    }

    // =============================================================================
    // UPLOAD AND SHARE
    // =============================================================================

    #[tokio::test]
    async fn test_upload_and_share_with_several_consumers() {
        let network = Network::new();
        let (owner, consumer, partner) = (Member::owner(), Member::consumer(), Member::partner());
        let target = data_key("report", "R7");
        let datas = json!([data_record("report", "R7")]);
        let grants = json!([
            with(
                consent_record(&consumer, &owner, &target),
                json!({"encryptedKeyForProposer": "k1"}),
            ),
            with(
                consent_record(&partner, &owner, &target),
                json!({"encryptedKeyForProposer": "k2"}),
            ),
        ]);

        let result = network
            .shares
            .upload_and_share(
                &network.as_member(&owner),
                &datas.to_string(),
                &grants.to_string(),
            )
            .await
            .unwrap();
        assert_eq!(result.datas.len(), 1);
        assert_eq!(result.grants.len(), 2);
        assert!(result
            .grants
            .iter()
            .all(|grant| grant.consent_status().unwrap() == ConsentStatus::Approved));

        let filter = json!({"proposerIdentity": partner.id}).to_string();
        let page = network
            .shares
            .list_by_state_type(&network.as_member(&partner), &filter, "", "")
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.items[0]["encryptedKeyForProposer"], json!("k2"));

        let all = network
            .shares
            .list_by_state_type(&network.as_member(&owner), "{}", "", "")
            .await
            .unwrap();
        assert_eq!(all.count, 2);
        assert_eq!(network.ledger.opened_iterators(), network.ledger.closed_iterators());
    }

    #[tokio::test]
    async fn test_upload_and_share_no_overwrite_keeps_first_version() {
        let network = Network::new();
        let (owner, consumer) = (Member::owner(), Member::consumer());
        let target = data_key("report", "R7");
        let grants = json!([with(
            consent_record(&consumer, &owner, &target),
            json!({"encryptedKeyForProposer": "k1"}),
        )])
        .to_string();
        let ctx = network.as_member(&owner);

        network
            .shares
            .upload_and_share_no_overwrite(&ctx, &json!([data_record("report", "R7")]).to_string(), &grants)
            .await
            .unwrap();
        let writes = network.ledger.write_count();

        let changed = with(data_record("report", "R7"), json!({"digest": "changed"}));
        let result = network
            .shares
            .upload_and_share_no_overwrite(&ctx, &json!([changed]).to_string(), &grants)
            .await
            .unwrap();
        assert_eq!(network.ledger.write_count(), writes);
        assert_eq!(result.datas[0].digest, "digest-R7");
    }

    // =============================================================================
    // CROSS-ORG AND CONCURRENT REQUESTS
    // =============================================================================

    #[tokio::test]
    async fn test_partner_org_request_is_approved_by_owner() {
        let network = network_with_house().await;
        let (owner, partner) = (Member::owner(), Member::partner());
        let target = data_key("house", "B1");
        let key = consent_key(&partner, &owner, &target);

        network
            .shares
            .request(
                &network.as_member(&partner),
                &consent_record(&partner, &owner, &target).to_string(),
            )
            .await
            .unwrap();
        let approved = network
            .shares
            .approve(
                &network.as_member(&owner),
                &key,
                &approval(&partner, &owner, &target),
            )
            .await
            .unwrap();
        assert_eq!(approved.org_msp_id, "Org2MSP");
        assert_eq!(approved.uploader_identity, partner.id);
    }

    #[tokio::test]
    async fn test_concurrent_requests_from_many_proposers() {
        let network = network_with_house().await;
        let owner = Member::owner();
        let target = data_key("house", "B1");
        let proposers: Vec<Member> = (1..=6)
            .map(|i| Member::new(&format!("0A0B{i:02X}"), "Org1MSP"))
            .collect();

        let results = join_all(proposers.iter().map(|proposer| {
            let ctx = network.as_member(proposer);
            let payload = consent_record(proposer, &owner, &target).to_string();
            let shares = &network.shares;
            async move { shares.request(&ctx, &payload).await }
        }))
        .await;
        assert!(results.iter().all(Result::is_ok));

        let first = network
            .shares
            .list_for_approver(&network.as_member(&owner), &owner.id, &target, "4", "")
            .await
            .unwrap();
        assert_eq!(first.count, 4);
        let bookmark = first.pagination_metadata.unwrap().bookmark;
        let rest = network
            .shares
            .list_for_approver(&network.as_member(&owner), &owner.id, &target, "4", &bookmark)
            .await
            .unwrap();
        assert_eq!(rest.count, 2);
    }
}
