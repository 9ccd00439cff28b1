mod common;

use std::sync::Arc;

use tempfile::TempDir;

use common::{test_app, FixedGenerator, HashEmbedder, HIGH_VERDICT};
use policy_check_core::models::{
    ChunkMetadata, ChunkVectorRecord, Issue, LogQuery, NewComplianceCheck, NewPolicyDocument,
    PolicyCategory, RiskLevel, Verdict,
};
use policy_check_core::store::{ComplianceLog, PolicyStore, RetrievalFilter, VectorIndex};
use policy_check_core::ComplianceError;

fn new_doc(title: &str, category: PolicyCategory, department: Option<&str>) -> NewPolicyDocument {
    NewPolicyDocument {
        title: title.to_string(),
        category,
        department: department.map(str::to_string),
        version: Some("2024.1".to_string()),
    }
}

fn check(department: Option<&str>, risk: RiskLevel) -> NewComplianceCheck {
    let issues = if risk == RiskLevel::None {
        vec![]
    } else {
        vec![Issue {
            issue_type: "Security".to_string(),
            policy_reference: None,
            excerpt: Some("password".to_string()),
            explanation: "Credentials must never be shared".to_string(),
        }]
    };
    NewComplianceCheck {
        input_text: format!("{:?} {}", department, risk),
        department: department.map(str::to_string),
        category: Some(PolicyCategory::Security),
        verdict: Verdict {
            overall_risk: risk,
            issues,
            suggested_text: None,
        },
    }
}

async fn app(tmp: &TempDir) -> policy_check::app::App {
    test_app(
        tmp,
        Arc::new(HashEmbedder::default()),
        Arc::new(FixedGenerator::new(HIGH_VERDICT)),
    )
    .await
}

#[tokio::test]
async fn test_document_round_trip_and_listing_order() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let store = &app.store;

    let first = store
        .insert_document("doc-a", &new_doc("Security", PolicyCategory::Security, None), "/p/a.pdf")
        .await
        .unwrap();
    let second = store
        .insert_document("doc-b", &new_doc("HR Handbook", PolicyCategory::Hr, Some("HR")), "/p/b.pdf")
        .await
        .unwrap();

    let fetched = store.get_document(&second.id).await.unwrap().unwrap();
    assert_eq!(fetched.title, "HR Handbook");
    assert_eq!(fetched.category, PolicyCategory::Hr);
    assert_eq!(fetched.department.as_deref(), Some("HR"));
    assert_eq!(fetched.version.as_deref(), Some("2024.1"));

    let listed = store.list_documents().await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    assert_eq!(store.count_documents().await.unwrap(), 2);
    assert!(store.get_document("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_cascades_to_chunks_and_vectors() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let store = &app.store;

    let doc = store
        .insert_document("doc-a", &new_doc("Security", PolicyCategory::Security, None), "/p/a.pdf")
        .await
        .unwrap();
    let chunks = store
        .replace_chunks(&doc.id, &["lock your screen".to_string(), "rotate keys".to_string()])
        .await
        .unwrap();
    assert_eq!(app.index.upsert(&chunks).await.unwrap(), 2);
    assert_eq!(store.vector_count().await.unwrap(), 2);

    assert!(store.delete_document(&doc.id).await.unwrap());
    assert!(store.chunks_for_document(&doc.id).await.unwrap().is_empty());
    assert_eq!(store.vector_count().await.unwrap(), 0);
    assert!(!store.delete_document(&doc.id).await.unwrap());
}

#[tokio::test]
async fn test_replace_chunks_requires_document() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;

    let err = app
        .store
        .replace_chunks("nope", &["text".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, ComplianceError::NotFound(_)));
}

#[tokio::test]
async fn test_vector_search_applies_filters() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let store = &app.store;

    let sales = store
        .insert_document(
            "doc-s",
            &new_doc("Pricing", PolicyCategory::Confidentiality, Some("Sales")),
            "/p/s.pdf",
        )
        .await
        .unwrap();
    let hr = store
        .insert_document("doc-h", &new_doc("Conduct", PolicyCategory::Hr, Some("HR")), "/p/h.pdf")
        .await
        .unwrap();
    let sales_chunks = store
        .replace_chunks(&sales.id, &["pricing is secret".to_string()])
        .await
        .unwrap();
    let hr_chunks = store
        .replace_chunks(&hr.id, &["be respectful".to_string()])
        .await
        .unwrap();

    let record = |chunk_id: &str,
                  doc_id: &str,
                  category: PolicyCategory,
                  department: &str,
                  text: &str,
                  v: Vec<f32>| {
        ChunkVectorRecord {
            chunk_id: chunk_id.to_string(),
            embedding: v,
            metadata: ChunkMetadata {
                document_id: doc_id.to_string(),
                chunk_id: chunk_id.to_string(),
                category,
                department: Some(department.to_string()),
                text: text.to_string(),
            },
        }
    };
    store
        .upsert(&[
            record(
                &sales_chunks[0].id,
                &sales.id,
                PolicyCategory::Confidentiality,
                "Sales",
                "pricing is secret",
                vec![1.0, 0.0],
            ),
            record(
                &hr_chunks[0].id,
                &hr.id,
                PolicyCategory::Hr,
                "HR",
                "be respectful",
                vec![0.9, 0.1],
            ),
        ])
        .await
        .unwrap();

    let all = store
        .search(&[1.0, 0.0], 10, &RetrievalFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].metadata.chunk_id, sales_chunks[0].id);
    assert_eq!(all[0].metadata.text, "pricing is secret");

    let hr_only = store
        .search(
            &[1.0, 0.0],
            10,
            &RetrievalFilter {
                department: Some("HR".to_string()),
                category: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(hr_only.len(), 1);
    assert_eq!(hr_only[0].metadata.category, PolicyCategory::Hr);
    assert_eq!(hr_only[0].metadata.text, "be respectful");

    let none = store
        .search(
            &[1.0, 0.0],
            10,
            &RetrievalFilter {
                department: Some("HR".to_string()),
                category: Some(PolicyCategory::Security),
            },
        )
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_log_filters_limit_and_order() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let store = &app.store;

    let mut ids = Vec::new();
    for (dept, risk) in [
        (Some("HR"), RiskLevel::High),
        (Some("Sales"), RiskLevel::Low),
        (None, RiskLevel::None),
        (Some("HR"), RiskLevel::Low),
    ] {
        ids.push(store.append(&check(dept, risk)).await.unwrap());
    }

    let all = store
        .list(&LogQuery {
            limit: 100,
            ..Default::default()
        })
        .await
        .unwrap();
    let listed: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
    let expected: Vec<&str> = ids.iter().rev().map(String::as_str).collect();
    assert_eq!(listed, expected);

    let risk: RiskLevel = "high".parse().unwrap();
    let high = store
        .list(&LogQuery {
            department: None,
            risk: Some(risk),
            limit: 100,
        })
        .await
        .unwrap();
    assert_eq!(high.len(), 1);
    assert_eq!(high[0].overall_risk, RiskLevel::High);
    assert_eq!(high[0].issues.len(), 1);

    let hr = store
        .list(&LogQuery {
            department: Some("HR".to_string()),
            risk: None,
            limit: 100,
        })
        .await
        .unwrap();
    assert_eq!(hr.len(), 2);

    let lower_hr = store
        .list(&LogQuery {
            department: Some("hr".to_string()),
            risk: None,
            limit: 100,
        })
        .await
        .unwrap();
    assert!(lower_hr.is_empty(), "department match is case-sensitive");

    let limited = store
        .list(&LogQuery {
            limit: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);

    let record = store.get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(record.category, Some(PolicyCategory::Security));
    assert_eq!(record.issues[0].excerpt.as_deref(), Some("password"));
    assert!(store.get("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_vector_records_keep_their_own_text() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let store = &app.store;

    let doc = store
        .insert_document("doc-v", &new_doc("Security", PolicyCategory::Security, None), "/p/v.pdf")
        .await
        .unwrap();
    let chunks = store
        .replace_chunks(&doc.id, &["rotate keys every quarter".to_string()])
        .await
        .unwrap();
    store
        .upsert(&[ChunkVectorRecord {
            chunk_id: chunks[0].id.clone(),
            embedding: vec![0.0, 1.0],
            metadata: ChunkMetadata {
                document_id: doc.id.clone(),
                chunk_id: chunks[0].id.clone(),
                category: PolicyCategory::Security,
                department: None,
                text: "indexed text".to_string(),
            },
        }])
        .await
        .unwrap();

    let hits = store
        .search(&[0.0, 1.0], 5, &RetrievalFilter::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.text, "indexed text");
    assert!((hits[0].score - 1.0).abs() < 1e-6);
}
