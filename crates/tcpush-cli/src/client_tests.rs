//! Tests for the HTTP clients.

#[cfg(test)]
mod tests {
    use crate::client::{HgPushlogClient, HttpGraphFetcher};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use tcpush_core::Error;
    use tcpush_core::ports::{GraphFetcher, PushlogClient};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_fetch_graph() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/myrepo/raw-file/abc/.taskcluster.yml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("version: 0\ntasks: []\n"))
            .mount(&server)
            .await;

        let fetcher = HttpGraphFetcher::new(TIMEOUT).unwrap();
        let url = format!("{}/myrepo/raw-file/abc/.taskcluster.yml", server.uri());
        let text = fetcher.fetch_graph(&url).await.unwrap();
        assert_eq!(text, "version: 0\ntasks: []\n");
    }

    #[tokio::test]
    async fn test_missing_graph_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpGraphFetcher::new(TIMEOUT).unwrap();
        let url = format!("{}/missing/.taskcluster.yml", server.uri());
        let err = fetcher.fetch_graph(&url).await.unwrap_err();
        assert!(matches!(err, Error::GraphNotFound(u) if u == url));
    }

    #[tokio::test]
    async fn test_server_error_is_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = HttpGraphFetcher::new(TIMEOUT).unwrap();
        let err = fetcher
            .fetch_graph(&format!("{}/graph.yml", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
    }

    #[tokio::test]
    async fn test_pushlog_get_one() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/myrepo/json-pushes"))
            .and(query_param("version", "2"))
            .and(query_param("full", "1"))
            .and(query_param("startID", "9998"))
            .and(query_param("endID", "9999"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "lastpushid": 10000,
                "pushes": {
                    "9999": {
                        "user": "ffxbld",
                        "date": 1499805383,
                        "changesets": [
                            {"node": "aaa", "desc": "first", "author": "someone"},
                            {"node": "bbb", "desc": "message!", "author": "someone"}
                        ]
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = HgPushlogClient::new(TIMEOUT).unwrap();
        let push = client
            .get_one(&format!("{}/myrepo", server.uri()), 9999)
            .await
            .unwrap();

        assert_eq!(push.id, 9999);
        assert_eq!(push.user, "ffxbld");
        assert_eq!(push.date, Some(1499805383));
        let tip = push.tip().unwrap();
        assert_eq!(tip.node, "bbb");
        assert_eq!(tip.desc, "message!");
    }

    #[tokio::test]
    async fn test_pushlog_missing_push() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/myrepo/json-pushes"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"lastpushid": 10, "pushes": {}})),
            )
            .mount(&server)
            .await;

        let client = HgPushlogClient::new(TIMEOUT).unwrap();
        let err = client
            .get_one(&format!("{}/myrepo/", server.uri()), 9999)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Pushlog(_)));
    }
}
