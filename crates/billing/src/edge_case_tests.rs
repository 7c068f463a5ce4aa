// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the checkout/webhook pipeline
//!
//! Tests critical boundary conditions across module seams:
//! - Initiation metadata read back by the extractor (JOIN-01 to JOIN-03)
//! - Verify-then-decode flow on raw bodies (WH-01 to WH-04)
//! - Degraded and hostile payloads (FX-01 to FX-03)

#[cfg(test)]
mod join_tests {
    use crate::checkout::{CheckoutMode, CheckoutParams};
    use crate::facts::{extract_facts, METADATA_PRO_ID};
    use serde_json::{json, Value};
    use slotpulse_shared::{PlanTier, PlanType};

    // Build the session payload Stripe would deliver for a session created
    // with the given params, using the same metadata builder the
    // initiation path uses.
    fn delivered_payload(pro_id: &str, params: &CheckoutParams) -> Value {
        let metadata = crate::checkout::test_support::metadata_for(pro_id, params);
        json!({
            "id": "cs_test_join",
            "mode": params.mode.as_str(),
            "payment_status": "paid",
            "client_reference_id": pro_id,
            "metadata": metadata,
        })
    }

    // =========================================================================
    // JOIN-01: Plan metadata written at initiation survives the round trip
    // =========================================================================
    #[test]
    fn plan_metadata_round_trips_through_session() {
        let params = CheckoutParams {
            pro_id: Some("pro-77".to_string()),
            quantity: 1,
            mode: CheckoutMode::Subscription,
            plan_type: Some(PlanType::LastMinute),
            plan_tier: Some(PlanTier::Pro),
            early_notice_minutes: Some(30),
            channels: Some(vec!["email".to_string(), "push".to_string()]),
            ..Default::default()
        };

        let facts = extract_facts(&delivered_payload("pro-77", &params));

        assert_eq!(facts.pro_id.as_deref(), Some("pro-77"));
        assert_eq!(facts.mode, CheckoutMode::Subscription);
        assert_eq!(facts.plan_type, "last_minute");
        assert_eq!(facts.plan_tier, "pro");
        assert_eq!(facts.early_notice_minutes, 30);
        assert_eq!(
            facts.channels,
            Some(vec!["email".to_string(), "push".to_string()])
        );
    }

    // =========================================================================
    // JOIN-02: Owner survives when the provider drops client_reference_id
    // =========================================================================
    #[test]
    fn owner_survives_via_metadata_when_reference_id_dropped() {
        let params = CheckoutParams {
            pro_id: Some("pro-77".to_string()),
            quantity: 1,
            ..Default::default()
        };

        let mut payload = delivered_payload("pro-77", &params);
        payload
            .as_object_mut()
            .unwrap()
            .remove("client_reference_id");

        let facts = extract_facts(&payload);
        assert_eq!(facts.pro_id.as_deref(), Some("pro-77"));
    }

    // =========================================================================
    // JOIN-03: Initiation without plan options yields the documented defaults
    // =========================================================================
    #[test]
    fn bare_initiation_yields_documented_defaults() {
        let params = CheckoutParams {
            pro_id: Some("pro-77".to_string()),
            quantity: 1,
            ..Default::default()
        };

        let facts = extract_facts(&delivered_payload("pro-77", &params));
        assert_eq!(facts.plan_type, "standard");
        assert_eq!(facts.plan_tier, "basic");
        assert_eq!(facts.early_notice_minutes, 60);
        assert_eq!(facts.channels, None);

        let metadata = crate::checkout::test_support::metadata_for("pro-77", &params);
        assert_eq!(metadata.keys().collect::<Vec<_>>(), vec![METADATA_PRO_ID]);
    }
}

#[cfg(test)]
mod webhook_flow_tests {
    use crate::error::BillingError;
    use crate::webhooks::{decode_event, verify_signature, EventKind};
    use hmac::{Hmac, Mac};
    use serde_json::json;
    use sha2::Sha256;

    const SECRET: &str = "whsec_edge";

    fn sign_now(payload: &str) -> String {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let key = SECRET.strip_prefix("whsec_").unwrap();
        let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes()).unwrap();
        mac.update(format!("{}.{}", now, payload).as_bytes());
        format!("t={},v1={}", now, hex::encode(mac.finalize().into_bytes()))
    }

    // =========================================================================
    // WH-01: Freshly signed body verifies and decodes end to end
    // =========================================================================
    #[test]
    fn signed_body_verifies_and_decodes() {
        let body = json!({
            "id": "evt_edge_1",
            "type": "checkout.session.completed",
            "created": 1_700_000_000,
            "data": { "object": { "id": "cs_1", "client_reference_id": "pro-1" } }
        })
        .to_string();

        let header = sign_now(&body);
        verify_signature(&body, &header, SECRET).unwrap();

        let event = decode_event(&body).unwrap();
        assert_eq!(event.kind, EventKind::CheckoutSessionCompleted);
    }

    // =========================================================================
    // WH-02: Whitespace-level re-serialization breaks the signature
    // =========================================================================
    #[test]
    fn reserialized_body_fails_verification() {
        let body = r#"{"id":"evt_edge_2","type":"checkout.session.completed","data":{"object":{}}}"#;
        let header = sign_now(body);

        // Same JSON, different bytes
        let pretty = serde_json::to_string_pretty(
            &serde_json::from_str::<serde_json::Value>(body).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            verify_signature(&pretty, &header, SECRET),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    // =========================================================================
    // WH-03: Signature from one body does not authorize another event kind
    // =========================================================================
    #[test]
    fn signature_is_not_transferable() {
        let original = r#"{"id":"evt_a","type":"checkout.session.completed","data":{"object":{}}}"#;
        let replayed = r#"{"id":"evt_b","type":"customer.subscription.deleted","data":{"object":{}}}"#;
        let header = sign_now(original);

        assert!(verify_signature(replayed, &header, SECRET).is_err());
    }

    // =========================================================================
    // WH-04: data.object may be absent for unrecognized kinds
    // =========================================================================
    #[test]
    fn unknown_kind_without_object_still_decodes() {
        let body = json!({ "id": "evt_edge_4", "type": "balance.available" }).to_string();
        let event = decode_event(&body).unwrap();
        assert_eq!(
            event.kind,
            EventKind::Other("balance.available".to_string())
        );
        assert!(event.payload.is_null());
    }
}

#[cfg(test)]
mod degraded_payload_tests {
    use crate::facts::extract_facts;
    use serde_json::json;

    // =========================================================================
    // FX-01: Metadata of entirely wrong types never panics the extractor
    // =========================================================================
    #[test]
    fn hostile_metadata_types_degrade_to_defaults() {
        let facts = extract_facts(&json!({
            "id": "cs_hostile",
            "client_reference_id": "pro-9",
            "metadata": {
                "plan_type": 12,
                "plan_tier": ["premium"],
                "early_notice_minutes": { "min": 5 },
                "channels": 42
            }
        }));

        assert_eq!(facts.pro_id.as_deref(), Some("pro-9"));
        assert_eq!(facts.plan_type, "standard");
        assert_eq!(facts.plan_tier, "basic");
        assert_eq!(facts.early_notice_minutes, 60);
        assert_eq!(facts.channels, None);
    }

    // =========================================================================
    // FX-02: A channels value that is valid JSON but not a string list
    //        degrades to the raw value, not a crash
    // =========================================================================
    #[test]
    fn non_list_channels_json_degrades_to_raw() {
        let facts = extract_facts(&json!({
            "id": "cs_x",
            "client_reference_id": "pro-9",
            "metadata": { "channels": "{\"email\":true}" }
        }));
        assert_eq!(facts.channels, Some(vec!["{\"email\":true}".to_string()]));
    }

    // =========================================================================
    // FX-03: Completely empty payload extracts to skippable facts
    // =========================================================================
    #[test]
    fn empty_payload_is_skippable_not_fatal() {
        let facts = extract_facts(&json!({}));
        assert_eq!(facts.pro_id, None);
        assert_eq!(facts.session_id, None);
    }
}
