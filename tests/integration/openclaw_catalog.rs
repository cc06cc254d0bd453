//! The built-in catalog against mock OpenClaw chunks, through the pure applier.

use crate::bundle;
use openclaw_patcher::catalog::builtin::{self, MARKER_FILE_ID, MARKER_URL};
use openclaw_patcher::{apply, Outcome, OutcomeKind};

fn outcome<'a>(application: &'a openclaw_patcher::Application, rule: &str) -> &'a Outcome {
    &application
        .outcomes
        .iter()
        .find(|o| o.rule_id == rule)
        .unwrap_or_else(|| panic!("no outcome for {rule}"))
        .outcome
}

#[test]
fn test_media_chunk_gets_every_media_rule() {
    let catalog = builtin::openclaw().unwrap();
    let result = apply(&bundle::media_chunk(), catalog.rules());

    for rule in [
        "resolve-media-signature",
        "resolve-media-get-file-path",
        "resolve-media-sticker",
        "resolve-media-lookup",
        "resolve-media-download",
    ] {
        assert!(
            matches!(outcome(&result, rule), Outcome::Applied { replaced: 1, left_over: 0, .. }),
            "{rule}: {:?}",
            outcome(&result, rule)
        );
    }
    assert_eq!(
        outcome(&result, "resolve-media-call-sites"),
        &Outcome::Applied {
            variant: 0,
            replaced: 2,
            left_over: 0
        }
    );
    assert_eq!(
        outcome(&result, "inject-large-file-id"),
        &Outcome::Applied {
            variant: 0,
            replaced: 1,
            left_over: 0
        }
    );
    assert_eq!(
        outcome(&result, "config-local-bot-api-url"),
        &Outcome::NotApplicable
    );

    let patched = &result.content;
    assert!(patched.contains(MARKER_URL));
    assert!(patched.contains(MARKER_FILE_ID));
    assert!(patched.contains("url: `${fileApiBase}/file/bot${token}/${filePath}`,"));
    assert!(!patched.contains("https://api.telegram.org/file/bot"));
    assert!(!patched.contains("resolveMedia(ctx, mediaMaxBytes, opts.token, opts.proxyFetch)"));
    assert_eq!(
        patched
            .matches("opts.proxyFetch, telegramCfg.localBotApiUrl)")
            .count(),
        2
    );
    assert!(patched.contains("\t\t/* tg-dl-localapi-patch */\n\t\tif (!media) {\n"));
}

#[test]
fn test_second_pass_is_a_no_op() {
    let catalog = builtin::openclaw().unwrap();
    for chunk in [
        bundle::config_chunk(),
        bundle::media_chunk(),
        bundle::nested_handler_chunk(),
    ] {
        let first = apply(&chunk, catalog.rules());
        assert!(first.changed());

        let second = apply(&first.content, catalog.rules());
        assert_eq!(second.content, first.content);
        assert!(!second.changed());

        for (before, after) in first.outcomes.iter().zip(&second.outcomes) {
            if before.outcome.is_applied() {
                assert_eq!(
                    after.outcome,
                    Outcome::AlreadyApplied,
                    "{} not idempotent",
                    before.rule_id
                );
            } else {
                assert_eq!(after.outcome, before.outcome);
            }
        }
    }
}

#[test]
fn test_nested_handler_uses_deeper_variant() {
    let catalog = builtin::openclaw().unwrap();
    let result = apply(&bundle::nested_handler_chunk(), catalog.rules());

    assert_eq!(
        outcome(&result, "inject-large-file-id"),
        &Outcome::Applied {
            variant: 1,
            replaced: 1,
            left_over: 0
        }
    );
    let patched = &result.content;
    assert!(patched.contains("\t\t\t/* tg-dl-localapi-patch */\n\t\t\tif (!media) {\n"));
    assert!(patched.contains("\n\t\t\tconst hasText = Boolean("));
    assert!(!patched.contains("\n\t\t/* tg-dl-localapi-patch */"));
}

#[test]
fn test_config_chunk() {
    let catalog = builtin::openclaw().unwrap();
    let result = apply(&bundle::config_chunk(), catalog.rules());

    assert!(outcome(&result, "config-local-bot-api-url").is_applied());
    assert!(result.content.contains(
        "\tmediaMaxMb: z.number().positive().optional(),\n\tlocalBotApiUrl: z.string().optional(),\n\ttimeoutSeconds:"
    ));
    let others = result
        .outcomes
        .iter()
        .filter(|o| o.rule_id != "config-local-bot-api-url")
        .all(|o| o.outcome.kind() == OutcomeKind::NotApplicable);
    assert!(others);
}

#[test]
fn test_vendor_chunk_untouched() {
    let catalog = builtin::openclaw().unwrap();
    let chunk = bundle::vendor_chunk();
    let result = apply(&chunk, catalog.rules());
    assert_eq!(result.content, chunk);
    assert!(result
        .outcomes
        .iter()
        .all(|o| o.outcome == Outcome::NotApplicable));
}

#[test]
fn test_drifted_call_site_is_near_miss() {
    let catalog = builtin::openclaw().unwrap();
    let drifted = bundle::media_chunk().replace(
        "opts.token, opts.proxyFetch)",
        "opts.token,  opts.proxyFetch)",
    );
    let result = apply(&drifted, catalog.rules());

    match outcome(&result, "resolve-media-call-sites") {
        Outcome::NearMiss(message) => {
            assert!(message.contains("resolve-media-call-sites"));
            assert!(message.contains("whitespace"));
        }
        other => panic!("expected near-miss, got {other:?}"),
    }
    assert!(result
        .content
        .contains("resolveMedia(ctx, mediaMaxBytes, opts.token,  opts.proxyFetch)"));
    // Rules before and after the drifted one still apply.
    assert!(outcome(&result, "resolve-media-download").is_applied());
    assert!(outcome(&result, "inject-large-file-id").is_applied());
}

#[test]
fn test_partially_patched_call_sites_converge() {
    let catalog = builtin::openclaw().unwrap();
    let patched = apply(&bundle::media_chunk(), catalog.rules()).content;

    // A host update regenerates one call site.
    let regressed = patched.replacen(
        "opts.proxyFetch, telegramCfg.localBotApiUrl)",
        "opts.proxyFetch)",
        1,
    );
    let result = apply(&regressed, catalog.rules());
    assert_eq!(
        outcome(&result, "resolve-media-call-sites"),
        &Outcome::Applied {
            variant: 0,
            replaced: 1,
            left_over: 0
        }
    );
    assert_eq!(result.content, patched);
}
