use std::sync::Arc;

use agent_core::{
    sample_rows, AgentError, LlmConfig, LlmProvider, MockLlmProvider, SchemaInferencer,
    WritingAssistant, DEFAULT_SAMPLE_ROWS,
};
use futures::StreamExt;
use grc_core_types::{Citation, ColumnType, Control};

const PEOPLE_CSV: &[u8] = b"name,age,city\nAda,36,London\nGrace,45,New York\n";

fn inferencer(provider: &MockLlmProvider) -> SchemaInferencer {
    SchemaInferencer::new(Arc::new(provider.clone()), "claude-3-haiku-20240307")
}

#[tokio::test]
async fn header_sample_yields_one_column_per_header_field() {
    let provider = MockLlmProvider::new().with_reply(
        "Here is the summary:\n```json\n[\
         {\"name\":\"name\",\"description\":\"Person name\",\"type\":\"Text\"},\
         {\"Name\":\"age\",\"Description\":\"Age in years\",\"Type\":\"number\"},\
         {\"name\":\"city\",\"description\":\"Home city\",\"type\":\"List\"}]\n```",
    );
    let rows = sample_rows(PEOPLE_CSV, DEFAULT_SAMPLE_ROWS).unwrap();

    let analysis = inferencer(&provider).infer("People", &rows).await;

    assert_eq!(analysis.application_name, "People");
    let names: Vec<&str> = analysis.column_names().collect();
    assert_eq!(names, vec!["name", "age", "city"]);
    assert_eq!(analysis.columns[1].column_type, ColumnType::Number);

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].temperature, 0.0);
    assert!(requests[0].prompt.contains("name,age,city\nAda,36,London"));
    assert!(!requests[0].prompt.contains("Grace"));
}

#[tokio::test]
async fn unknown_type_tag_degrades_to_empty() {
    let provider = MockLlmProvider::new().with_reply(
        r#"[{"name":"name","description":"","type":"string"},
            {"name":"age","description":"","type":"integer"},
            {"name":"city","description":"","type":"string"}]"#,
    );
    let rows = sample_rows(PEOPLE_CSV, DEFAULT_SAMPLE_ROWS).unwrap();
    let analysis = inferencer(&provider).infer("People", &rows).await;
    assert!(analysis.is_empty());
    assert!(analysis.ensure_columns().is_err());
}

#[tokio::test]
async fn column_count_mismatch_degrades_to_empty() {
    let provider = MockLlmProvider::new()
        .with_reply(r#"[{"name":"name","description":"","type":"Text"}]"#);
    let rows = sample_rows(PEOPLE_CSV, DEFAULT_SAMPLE_ROWS).unwrap();
    assert!(inferencer(&provider).infer("People", &rows).await.is_empty());
}

#[tokio::test]
async fn provider_failure_and_prose_replies_degrade_to_empty() {
    let provider = MockLlmProvider::new();
    provider.push_error(AgentError::provider("503"));
    provider.push_reply("I could not work out the columns, sorry.");
    let rows = vec!["Ada,36,London".to_string()];
    let inferencer = inferencer(&provider);
    assert!(inferencer.infer("People", &rows).await.is_empty());
    assert!(inferencer.infer("People", &rows).await.is_empty());
}

#[tokio::test]
async fn headerless_row_keeps_synthesized_names() {
    let provider = MockLlmProvider::new().with_reply(
        r#"[{"name":"first_name","description":"","type":"Text"},
            {"name":"age","description":"","type":"Number"}]"#,
    );
    let rows = vec!["Ada,36".to_string()];
    let analysis = inferencer(&provider).infer("People", &rows).await;
    assert_eq!(analysis.columns.len(), 2);
    assert!(provider.requests()[0].prompt.contains("no header row"));
}

#[tokio::test]
async fn no_rows_skips_the_model() {
    let provider = MockLlmProvider::new();
    assert!(inferencer(&provider).infer("People", &[]).await.is_empty());
    assert!(provider.requests().is_empty());
}

fn assistant(provider: &MockLlmProvider) -> WritingAssistant {
    WritingAssistant::new(Arc::new(provider.clone()), LlmConfig::default())
}

#[tokio::test]
async fn complete_reads_completion_case_insensitively() {
    let provider =
        MockLlmProvider::new().with_reply("```json\n{ \"Completion\": \" and then some.\" }\n```");
    let text = assistant(&provider).complete("Once upon a time").await.unwrap();
    assert_eq!(text, " and then some.");

    let request = &provider.requests()[0];
    assert_eq!(request.model, "claude-3-haiku-20240307");
    assert_eq!(request.temperature, 1.0);
}

#[tokio::test]
async fn complete_degrades_to_empty_on_garbage() {
    let provider = MockLlmProvider::new().with_reply("no json here");
    assert_eq!(assistant(&provider).complete("x").await.unwrap(), "");
}

#[tokio::test]
async fn map_control_treats_null_as_no_mappings() {
    let provider = MockLlmProvider::new()
        .with_reply(r#"{"mappings": [1, 2]}"#)
        .with_reply(r#"{"mappings": null}"#);
    let control = Control {
        id: 101.0,
        name: "Check the accuracy of restricted data.".into(),
        citation_ids: vec![],
    };
    let citations = vec![
        Citation::new(1, "Confirms accuracy of PII upon collection"),
        Citation::new(2, "Corrects inaccurate PII"),
    ];
    let assistant = assistant(&provider);

    assert_eq!(assistant.map_control(&control, &citations).await.unwrap(), vec![1, 2]);
    assert!(assistant.map_control(&control, &citations).await.unwrap().is_empty());

    let request = &provider.requests()[0];
    assert_eq!(request.temperature, 0.0);
    assert!(request.prompt.contains("<citation id=\"2\">Corrects inaccurate PII</citation>"));
}

#[tokio::test]
async fn write_streams_html_with_sonnet() {
    let provider = MockLlmProvider::new().with_reply("<h1>Policy</h1> <p>Draft</p>");
    let stream = assistant(&provider)
        .write("Draft an access policy", "")
        .await
        .unwrap();
    let chunks: Vec<String> = stream.map(|chunk| chunk.unwrap()).collect().await;
    assert!(chunks.len() > 1);
    assert_eq!(chunks.concat(), "<h1>Policy</h1> <p>Draft</p>");
    assert_eq!(provider.requests()[0].model, "claude-3-sonnet-20240229");
}

#[tokio::test]
async fn write_rejects_blank_prompt() {
    let provider = MockLlmProvider::new();
    let err = assistant(&provider).write("  ", "").await.err().unwrap();
    assert!(matches!(err, AgentError::InvalidRequest(_)));
}

#[tokio::test]
async fn default_stream_falls_back_to_single_chunk() {
    struct Plain;

    #[async_trait::async_trait]
    impl LlmProvider for Plain {
        async fn complete(
            &self,
            _request: &agent_core::CompletionRequest,
        ) -> Result<String, AgentError> {
            Ok("whole reply".into())
        }
    }

    let request = agent_core::CompletionRequest::new("m", "p");
    let chunks: Vec<_> = Plain.stream(&request).await.unwrap().collect().await;
    assert_eq!(chunks, vec![Ok("whole reply".to_string())]);
}
