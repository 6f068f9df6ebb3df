mod common;

use alloy::primitives::Address;
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use certifi::chain::{CredentialRegistry, IssueCredential};
use certifi::crypto::{credential_hash, document_hash, parse_hash, to_hex};
use certifi::db::{NewCertificate, NewStudent};
use certifi::types::certificate::CertificateData;
use common::{
    ADMIN, TestApp, cookie_header, institution_user, issuer, issuer_signer, spawn_app, student_user,
};
use serde_json::{Value, json};

const STUDENT_WALLET: &str = "0x5700000000000000000000000000000000000001";
const FILE: &[u8] = b"%PDF-1.7 diploma of Ada Lovelace";

async fn wallet_sign_in(app: &TestApp, signer: &PrivateKeySigner, role: &str) -> (StatusCode, Value, String) {
    let address = signer.address().to_string();
    let message = format!("Sign in to Certifi as {address}");
    let signature = signer
        .sign_message_sync(message.as_bytes())
        .expect("sign message");
    let body = json!({
        "address": address,
        "signature": format!("0x{}", hex::encode(signature.as_bytes())),
        "message": message,
        "role": role,
    });
    let (status, headers, json) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/wallet")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await;
    (status, json, cookie_header(&headers))
}

async fn seed_student(app: &TestApp) {
    app.state
        .storage
        .upsert_student_by_email(
            "ada@example.org",
            "Ada Lovelace",
            None,
            NewStudent {
                student_id: "STU000001".into(),
                wallet_address: Some(STUDENT_WALLET.into()),
                ..NewStudent::default()
            },
        )
        .await
        .expect("seed student");
}

async fn signed_in_institution(app: &TestApp) -> (PrivateKeySigner, String) {
    let signer = PrivateKeySigner::random();
    let (status, _, cookie) = wallet_sign_in(app, &signer, "institution").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .mutate(
            Some(&cookie),
            "institutions.register",
            json!({ "name": "Analytical University" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    (signer, cookie)
}

fn issue_input() -> Value {
    json!({
        "studentId": "STU000001",
        "certificateTitle": "BSc Mathematics",
        "certificateCourse": "Mathematics",
        "issueDate": "2024-06-30",
        "fileName": "diploma.pdf",
        "fileBase64": STANDARD.encode(FILE),
    })
}

async fn verify(app: &TestApp, hash: &str) -> (StatusCode, Value) {
    let (status, _, body) = app
        .send(
            Request::builder()
                .uri(format!("/api/verify/{hash}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    (status, body)
}

#[tokio::test]
async fn wallet_sign_in_sets_a_session() {
    let app = spawn_app().await;
    let signer = PrivateKeySigner::random();

    let (status, user, cookie) = wallet_sign_in(&app, &signer, "institution").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["role"], "institution");
    assert_eq!(user["approved"], true);
    assert!(user["name"].as_str().unwrap_or_default().starts_with("Institution 0x"));
    assert!(cookie.contains("certifi_session="));

    let (status, _, session) = app
        .send(
            Request::builder()
                .uri("/api/auth/session")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["id"], signer.address().to_string());

    let (_, _, session) = app
        .send(
            Request::builder()
                .uri("/api/auth/session")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert!(session.is_null());
}

#[tokio::test]
async fn wallet_sign_in_rejects_foreign_signatures() {
    let app = spawn_app().await;
    let signer = PrivateKeySigner::random();
    let impostor = PrivateKeySigner::random();
    let message = "Sign in to Certifi";
    let signature = impostor
        .sign_message_sync(message.as_bytes())
        .expect("sign message");

    let (status, headers, body) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/wallet")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "address": signer.address().to_string(),
                        "signature": format!("0x{}", hex::encode(signature.as_bytes())),
                        "message": message,
                    })
                    .to_string(),
                ))
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert!(cookie_header(&headers).is_empty());

    let (status, _, _) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/wallet")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "address": "0x01" }).to_string()))
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn issued_certificates_verify_on_chain() {
    let app = spawn_app().await;
    seed_student(&app).await;
    let (signer, cookie) = signed_in_institution(&app).await;

    let (status, body) = app.mutate(Some(&cookie), "certificates.issue", issue_input()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let outcome = &body["result"]["data"];

    let expected = credential_hash(&CertificateData {
        recipient_name: "Ada Lovelace".into(),
        recipient_email: "ada@example.org".into(),
        recipient_id: "STU000001".into(),
        certificate_title: "BSc Mathematics".into(),
        certificate_course: "Mathematics".into(),
        issue_date: "2024-06-30".into(),
    });
    assert_eq!(outcome["credentialHash"], to_hex(&expected));
    assert!(outcome["transactionHash"].as_str().unwrap_or_default().starts_with("0x"));
    assert!(outcome["metadataURI"].as_str().unwrap_or_default().starts_with("ipfs://bafy"));

    let cert = &outcome["certificate"];
    assert_eq!(cert["studentId"], "STU000001");
    assert_eq!(cert["institution"], "Analytical University");
    assert_eq!(cert["degree"], "BSc Mathematics");
    assert_eq!(cert["documentHash"], document_hash(FILE));
    assert_eq!(
        cert["issuerAddress"],
        signer.address().to_string().to_lowercase()
    );

    let (status, result) = verify(&app, &to_hex(&expected)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["isValid"], true);
    assert_eq!(result["onChain"], true);
    assert_eq!(result["issuer"], issuer().to_string());
    assert_eq!(result["metadataURI"], outcome["metadataURI"]);
    assert_eq!(result["revoked"], false);
    assert_eq!(result["anchoredDocumentHash"], document_hash(FILE));
    assert_eq!(result["certificate"]["studentId"], "STU000001");

    let student_wallet: Address = STUDENT_WALLET.parse().expect("wallet");
    let anchored = app
        .state
        .registry
        .get_student_certificates(student_wallet)
        .await
        .expect("student certificates");
    assert_eq!(anchored, vec![expected]);

    let (status, _, result) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/verify/document")
                .body(Body::from(FILE))
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["documentHash"], document_hash(FILE));
    assert_eq!(result["isValid"], true);

    let (status, _, _) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/verify/document")
                .body(Body::from("some other file"))
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.mutate(Some(&cookie), "certificates.issue", issue_input()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["data"]["code"], "CONFLICT");
}

#[tokio::test]
async fn verification_of_unknown_and_malformed_hashes() {
    let app = spawn_app().await;

    let unknown = to_hex(&parse_hash(&"ab".repeat(32)).expect("hash"));
    let (status, result) = verify(&app, &unknown).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["isValid"], false);
    assert_eq!(result["onChain"], false);
    assert!(result["certificate"].is_null());

    let (status, body) = verify(&app, "0x1234").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _, result) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/verify")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "credentialHash": unknown.to_uppercase().replacen("0X", "0x", 1) }).to_string()))
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["credentialHash"], unknown);
}

#[tokio::test]
async fn only_the_issuer_can_revoke() {
    let app = spawn_app().await;
    seed_student(&app).await;
    let (_, cookie) = signed_in_institution(&app).await;
    let (_, body) = app.mutate(Some(&cookie), "certificates.issue", issue_input()).await;
    let hash = body["result"]["data"]["credentialHash"]
        .as_str()
        .expect("credential hash")
        .to_string();

    let other = app.session_cookie(&institution_user("0x0000000000000000000000000000000000000002"));
    let (status, _) = app
        .mutate(Some(&other), "certificates.revoke", json!({ "credentialHash": hash }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .mutate(Some(&cookie), "certificates.revoke", json!({ "credentialHash": hash }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["data"]["success"], true);

    let (_, result) = verify(&app, &hash).await;
    assert_eq!(result["isValid"], false);
    assert_eq!(result["onChain"], true);
    assert_eq!(result["revoked"], true);
}

#[tokio::test]
async fn suspended_institutions_cannot_issue() {
    let app = spawn_app().await;
    seed_student(&app).await;
    let (signer, cookie) = signed_in_institution(&app).await;

    let admin = app.session_cookie(&institution_user(ADMIN));
    let (status, _) = app
        .mutate(
            Some(&admin),
            "institutions.suspend",
            json!({ "address": signer.address().to_string() }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.mutate(Some(&cookie), "certificates.issue", issue_input()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "Institution is suspended");
}

#[tokio::test]
async fn suspended_institutions_cannot_record_or_revoke() {
    let app = spawn_app().await;
    seed_student(&app).await;
    let (signer, cookie) = signed_in_institution(&app).await;
    let (_, body) = app.mutate(Some(&cookie), "certificates.issue", issue_input()).await;
    let hash = body["result"]["data"]["credentialHash"]
        .as_str()
        .expect("credential hash")
        .to_string();

    let admin = app.session_cookie(&institution_user(ADMIN));
    app.mutate(
        Some(&admin),
        "institutions.suspend",
        json!({ "address": signer.address().to_string(), "reason": "audit" }),
    )
    .await;

    let (status, body) = app
        .mutate(
            Some(&cookie),
            "certificates.create",
            json!({
                "studentId": "STU000001",
                "institution": "Analytical University",
                "degree": "MSc Mathematics",
                "fieldOfStudy": "Mathematics",
                "startDate": "2024-09-01",
                "credentialHash": format!("0x{}", "cd".repeat(32)),
                "transactionHash": format!("0x{}", "ef".repeat(32)),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "Institution is suspended");

    let (status, _) = app
        .mutate(Some(&cookie), "certificates.revoke", json!({ "credentialHash": hash }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, result) = verify(&app, &hash).await;
    assert_eq!(result["isValid"], true);
}

#[tokio::test]
async fn issued_documents_cannot_be_claimed_by_another_institution() {
    let app = spawn_app().await;
    seed_student(&app).await;
    let (_, cookie) = signed_in_institution(&app).await;
    let (status, _) = app.mutate(Some(&cookie), "certificates.issue", issue_input()).await;
    assert_eq!(status, StatusCode::OK);

    let (_, shadow) = signed_in_institution(&app).await;
    let (status, body) = app
        .mutate(
            Some(&shadow),
            "certificates.create",
            json!({
                "studentId": "STU000001",
                "institution": "Shadow U",
                "degree": "BSc Mathematics",
                "fieldOfStudy": "Mathematics",
                "startDate": "2020-09-01",
                "documentHash": document_hash(FILE),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["data"]["code"], "CONFLICT");

    // A later unanchored row for the same file must not outrank the issued one.
    app.state
        .storage
        .insert_certificate(NewCertificate {
            student_id: "STU000001".into(),
            institution: "Shadow U".into(),
            degree: "BSc Mathematics".into(),
            field_of_study: "Mathematics".into(),
            start_date: "2020-09-01".into(),
            issue_date: "2024-07-01".into(),
            document_hash: Some(document_hash(FILE)),
            ..NewCertificate::default()
        })
        .await
        .expect("insert shadow row");

    let (status, _, result) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/verify/document")
                .body(Body::from(FILE))
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["isValid"], true);
    assert_eq!(result["certificate"]["institution"], "Analytical University");
}

#[tokio::test]
async fn expired_credentials_do_not_verify() {
    let app = spawn_app().await;
    let hash = parse_hash(&"e1".repeat(32)).expect("hash");
    app.state
        .registry
        .issue_credential(IssueCredential {
            credential_hash: hash,
            expiry: 1,
            metadata_uri: "ipfs://bafyexpired".into(),
            document_hash: None,
            recipient: None,
        })
        .await
        .expect("issue");

    let (status, result) = verify(&app, &to_hex(&hash)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["onChain"], true);
    assert_eq!(result["expired"], true);
    assert_eq!(result["revoked"], false);
    assert_eq!(result["isValid"], false);
    assert_eq!(result["expiryDate"], "1970-01-01T00:00:01Z");
}

#[tokio::test]
async fn students_list_their_anchored_credentials() {
    let app = spawn_app().await;
    seed_student(&app).await;
    let (_, cookie) = signed_in_institution(&app).await;
    let (_, body) = app.mutate(Some(&cookie), "certificates.issue", issue_input()).await;
    let hash = body["result"]["data"]["credentialHash"].clone();

    let student = app.session_cookie(&student_user("ada@example.org"));
    let (status, body) = app
        .query(Some(&student), "certificates.getOnChainByStudent", Value::Null)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["result"]["data"], json!([hash]));

    let (status, body) = app
        .query(
            Some(&cookie),
            "certificates.getOnChainByStudent",
            json!({ "address": STUDENT_WALLET }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["data"], json!([hash]));

    let (status, _) = app
        .query(
            Some(&cookie),
            "certificates.getOnChainByStudent",
            json!({ "address": "not-a-wallet" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn issuer_signatures_verify_against_the_registry() {
    let app = spawn_app().await;
    seed_student(&app).await;
    let (_, cookie) = signed_in_institution(&app).await;
    let (_, body) = app.mutate(Some(&cookie), "certificates.issue", issue_input()).await;
    let hash = body["result"]["data"]["credentialHash"]
        .as_str()
        .expect("credential hash")
        .to_string();
    let hash_bytes = parse_hash(&hash).expect("hash");

    let check = |signer: &PrivateKeySigner| {
        let signature = signer
            .sign_message_sync(hash_bytes.as_slice())
            .expect("sign hash");
        json!({
            "credentialHash": hash,
            "signature": format!("0x{}", hex::encode(signature.as_bytes())),
            "issuer": issuer().to_string(),
        })
    };
    let post = |body: Value| {
        Request::builder()
            .method("POST")
            .uri("/api/verify/signature")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    };

    let (status, _, result) = app.send(post(check(&issuer_signer()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["signatureValid"], true);
    assert_eq!(result["credentialHash"], hash);

    let (status, _, result) = app.send(post(check(&PrivateKeySigner::random()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["signatureValid"], false);

    let mut malformed = check(&issuer_signer());
    malformed["signature"] = json!("not-hex");
    let (status, _, _) = app.send(post(malformed)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn issuing_for_an_unknown_student_fails() {
    let app = spawn_app().await;
    let (_, cookie) = signed_in_institution(&app).await;
    let (status, body) = app.mutate(Some(&cookie), "certificates.issue", issue_input()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Student not found");
}

#[tokio::test]
async fn ipfs_routes_pin_and_fetch() {
    let app = spawn_app().await;

    let (status, _, body) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/ipfs/upload")
                .body(Body::from(FILE))
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let cookie = app.session_cookie(&institution_user("0x0000000000000000000000000000000000000003"));
    let (status, _, pinned) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/ipfs/upload")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/pdf")
                .header("x-file-name", "diploma.pdf")
                .body(Body::from(FILE))
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let cid = pinned["cid"].as_str().expect("cid").to_string();
    assert_eq!(pinned["uri"], format!("ipfs://{cid}"));
    assert!(pinned["gatewayUrl"].as_str().unwrap_or_default().ends_with(&cid));

    let (status, _, pinned) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/ipfs/metadata")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "title": "BSc" }).to_string()))
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(pinned["cid"].as_str().unwrap_or_default().starts_with("bafy"));

    let (status, _, doc) = app
        .send(
            Request::builder()
                .uri(format!("/api/ipfs/{cid}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["cid"], cid);
}

#[tokio::test]
async fn ipfs_fetch_only_follows_cids() {
    let app = spawn_app().await;

    let internal = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind internal service");
    let port = internal.local_addr().expect("internal addr").port();
    tokio::spawn(async move {
        let app = axum::Router::new().route(
            "/admin/keys",
            axum::routing::get(|| async { axum::Json(json!({ "internal_secret": "keys" })) }),
        );
        axum::serve(internal, app).await.expect("internal service");
    });

    for path in [
        format!("/api/ipfs/http:%2F%2F127.0.0.1:{port}%2Fadmin%2Fkeys"),
        format!("/api/ipfs/%2F%2F127.0.0.1:{port}%2Fadmin%2Fkeys"),
        "/api/ipfs/..%2F..%2Fadmin".to_string(),
    ] {
        let (status, _, body) = app
            .send(Request::builder().uri(path.as_str()).body(Body::empty()).expect("request"))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
        assert!(body.get("internal_secret").is_none());
    }
}
