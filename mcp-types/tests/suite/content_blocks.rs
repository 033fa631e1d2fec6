//! Content blocks and completion references are discriminated on their
//! `type` field. Image and audio blocks carry identical payload fields, so
//! these tests pin down that the tag, not field shape, decides the variant.

use mcp_types::AudioContent;
use mcp_types::CompletionReference;
use mcp_types::ContentBlock;
use mcp_types::ImageContent;
use mcp_types::PromptReference;
use mcp_types::ResourceLink;
use mcp_types::ResourceTemplateReference;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn image_and_audio_blocks_decode_by_tag() {
    let image = json!({"type": "image", "data": "aWJt", "mimeType": "image/png"});
    let audio = json!({"type": "audio", "data": "aWJt", "mimeType": "audio/ogg"});

    assert_eq!(
        serde_json::from_value::<ContentBlock>(image).expect("image"),
        ContentBlock::Image(ImageContent {
            data: "aWJt".to_string(),
            mime_type: "image/png".to_string(),
            annotations: None,
        })
    );
    assert_eq!(
        serde_json::from_value::<ContentBlock>(audio).expect("audio"),
        ContentBlock::Audio(AudioContent {
            data: "aWJt".to_string(),
            mime_type: "audio/ogg".to_string(),
            annotations: None,
        })
    );
}

#[test]
fn resource_link_roundtrips_with_tag() {
    let block = ContentBlock::ResourceLink(ResourceLink {
        uri: "memo://welcome".to_string(),
        name: "welcome".to_string(),
        title: None,
        description: Some("the welcome memo".to_string()),
        mime_type: Some("text/plain".to_string()),
    });

    let wire = serde_json::to_value(&block).expect("serialize");
    assert_eq!(wire.get("type"), Some(&json!("resource_link")));
    let back: ContentBlock = serde_json::from_value(wire).expect("deserialize");
    assert_eq!(back, block);
}

#[test]
fn completion_references_discriminate_on_ref_type() {
    let prompt_ref = json!({"type": "ref/prompt", "name": "greeting"});
    assert_eq!(
        serde_json::from_value::<CompletionReference>(prompt_ref).expect("prompt ref"),
        CompletionReference::Prompt(PromptReference {
            name: "greeting".to_string(),
        })
    );

    let resource_ref = json!({"type": "ref/resource", "uri": "memo://{slug}"});
    assert_eq!(
        serde_json::from_value::<CompletionReference>(resource_ref).expect("resource ref"),
        CompletionReference::Resource(ResourceTemplateReference {
            uri: "memo://{slug}".to_string(),
        })
    );

    // An unknown tag is a decode error, not a silent fallback.
    let bogus = json!({"type": "ref/unknown", "name": "x"});
    assert!(serde_json::from_value::<CompletionReference>(bogus).is_err());
}
