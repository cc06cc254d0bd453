//! Built-in rules for the OpenClaw Telegram dist bundle.
//!
//! Three phases:
//! 1. `config-schema`: accept `localBotApiUrl` in the Telegram channel schema.
//! 2. `local-bot-api-url`: route file downloads in `resolveMedia` through a
//!    Local Bot API server when one is configured.
//! 3. `file-id-injection`: when a large file cannot be downloaded, append its
//!    `file_id` to the message text so the agent can still reference it.

use crate::catalog::schema::{Catalog, Metadata, Phase, Rule, ValidationError};

/// Sentinel left by the `resolveMedia` signature rewrite.
pub const MARKER_URL: &str = "/* tg-localapi-url-patch */";
/// Sentinel left by the file_id injection block.
pub const MARKER_FILE_ID: &str = "/* tg-dl-localapi-patch */";

const RESOLVE_MEDIA_ANCHOR: &str = "async function resolveMedia(";

fn lines(parts: &[&str]) -> String {
    parts.join("\n")
}

/// The OpenClaw catalog.
///
/// Fails only if the table below is edited into an invalid state, which the
/// tests catch.
pub fn openclaw() -> Result<Catalog, ValidationError> {
    let phases = vec![
        Phase::new("config-schema", "Config schema"),
        Phase::new("local-bot-api-url", "Local Bot API URL"),
        Phase::new("file-id-injection", "File ID injection"),
    ];

    let mut rules = vec![config_schema()];
    rules.extend(local_bot_api_url());
    rules.push(file_id_injection());

    Catalog::new(
        Metadata {
            name: "openclaw-telegram-local-bot-api".to_string(),
            description: Some(
                "Local Bot API downloads and large-file file_id passthrough for OpenClaw"
                    .to_string(),
            ),
        },
        phases,
        rules,
    )
}

fn config_schema() -> Rule {
    Rule::new(
        "config-local-bot-api-url",
        "config-schema",
        "mediaMaxMb: z.number()",
        "mediaMaxMb: z.number().positive().optional(),\n\ttimeoutSeconds:",
        "mediaMaxMb: z.number().positive().optional(),\n\tlocalBotApiUrl: z.string().optional(),\n\ttimeoutSeconds:",
    )
    .marker("localBotApiUrl: z.string().optional()")
    .describe("add localBotApiUrl to the Telegram channel config schema")
}

fn local_bot_api_url() -> Vec<Rule> {
    let signature = Rule::new(
        "resolve-media-signature",
        "local-bot-api-url",
        RESOLVE_MEDIA_ANCHOR,
        lines(&[
            "async function resolveMedia(ctx, maxBytes, token, proxyFetch) {",
            "\tconst msg = ctx.message;",
            "\tconst downloadAndSaveTelegramFile = async (filePath, fetchImpl) => {",
            "\t\tconst fetched = await fetchRemoteMedia({",
            "\t\t\turl: `https://api.telegram.org/file/bot${token}/${filePath}`,",
        ]),
        lines(&[
            "async function resolveMedia(ctx, maxBytes, token, proxyFetch, localBotApiUrl) {",
            &format!("\t{MARKER_URL}"),
            "\tconst msg = ctx.message;",
            "\tconst fileApiBase = localBotApiUrl ? localBotApiUrl.replace(/\\/+$/, \"\") : \"https://api.telegram.org\";",
            "\tconst downloadAndSaveTelegramFile = async (filePath, fetchImpl) => {",
            "\t\tconst fetched = await fetchRemoteMedia({",
            "\t\t\turl: `${fileApiBase}/file/bot${token}/${filePath}`,",
        ]),
    )
    .marker(MARKER_URL)
    .describe("take localBotApiUrl and derive the file download base from it");

    let get_file_path = Rule::new(
        "resolve-media-get-file-path",
        "local-bot-api-url",
        RESOLVE_MEDIA_ANCHOR,
        lines(&[
            "\t\treturn saveMediaBuffer(fetched.buffer, fetched.contentType, \"inbound\", maxBytes, originalName);",
            "\t};",
            "\tif (msg.sticker) {",
        ]),
        lines(&[
            "\t\treturn saveMediaBuffer(fetched.buffer, fetched.contentType, \"inbound\", maxBytes, originalName);",
            "\t};",
            "\tconst getFilePath = async (fileId, fetchImpl) => {",
            "\t\tif (!localBotApiUrl) return (await ctx.getFile()).file_path ?? null;",
            "\t\tconst res = await fetchImpl(`${fileApiBase}/bot${token}/getFile?file_id=${encodeURIComponent(fileId)}`);",
            "\t\tif (!res.ok) {",
            "\t\t\tconst body = await res.text().catch(() => \"\");",
            "\t\t\tthrow new Error(`Local Bot API getFile failed (${res.status}): ${body}`);",
            "\t\t}",
            "\t\treturn (await res.json())?.result?.file_path ?? null;",
            "\t};",
            "\tif (msg.sticker) {",
        ]),
    )
    .marker("const getFilePath = async (fileId, fetchImpl) => {")
    .describe("add a getFilePath helper that asks the Local Bot API for file paths");

    let sticker = Rule::new(
        "resolve-media-sticker",
        "local-bot-api-url",
        RESOLVE_MEDIA_ANCHOR,
        lines(&[
            "\t\t\tconst file = await ctx.getFile();",
            "\t\t\tif (!file.file_path) {",
            "\t\t\t\tlogVerbose(\"telegram: getFile returned no file_path for sticker\");",
            "\t\t\t\treturn null;",
            "\t\t\t}",
            "\t\t\tconst fetchImpl = proxyFetch ?? globalThis.fetch;",
            "\t\t\tif (!fetchImpl) {",
            "\t\t\t\tlogVerbose(\"telegram: fetch not available for sticker download\");",
            "\t\t\t\treturn null;",
            "\t\t\t}",
            "\t\t\tconst saved = await downloadAndSaveTelegramFile(file.file_path, fetchImpl);",
        ]),
        lines(&[
            "\t\t\tconst fetchImpl = proxyFetch ?? globalThis.fetch;",
            "\t\t\tif (!fetchImpl) {",
            "\t\t\t\tlogVerbose(\"telegram: fetch not available for sticker download\");",
            "\t\t\t\treturn null;",
            "\t\t\t}",
            "\t\t\tconst stickerFilePath = await getFilePath(sticker.file_id, fetchImpl);",
            "\t\t\tif (!stickerFilePath) {",
            "\t\t\t\tlogVerbose(\"telegram: getFile returned no file_path for sticker\");",
            "\t\t\t\treturn null;",
            "\t\t\t}",
            "\t\t\tconst saved = await downloadAndSaveTelegramFile(stickerFilePath, fetchImpl);",
        ]),
    )
    .marker("const stickerFilePath = await getFilePath(sticker.file_id, fetchImpl);")
    .describe("resolve sticker file paths through getFilePath");

    let media_lookup = Rule::new(
        "resolve-media-lookup",
        "local-bot-api-url",
        RESOLVE_MEDIA_ANCHOR,
        lines(&[
            "\tif (!(msg.photo?.[msg.photo.length - 1] ?? msg.video ?? msg.video_note ?? msg.document ?? msg.audio ?? msg.voice)?.file_id) return null;",
            "\tlet file;",
            "\ttry {",
            "\t\tfile = await retryAsync(() => ctx.getFile(), {",
        ]),
        lines(&[
            "\tconst m = msg.photo?.[msg.photo.length - 1] ?? msg.video ?? msg.video_note ?? msg.document ?? msg.audio ?? msg.voice;",
            "\tif (!m?.file_id) return null;",
            "\tconst fetchImpl = proxyFetch ?? globalThis.fetch;",
            "\tif (!fetchImpl) throw new Error(\"fetch is not available; set channels.telegram.proxy in config\");",
            "\tlet filePath;",
            "\ttry {",
            "\t\tfilePath = await retryAsync(() => getFilePath(m.file_id, fetchImpl), {",
        ]),
    )
    .marker("filePath = await retryAsync(() => getFilePath(m.file_id, fetchImpl), {")
    .describe("look up the main media file path through getFilePath with retries");

    let media_download = Rule::new(
        "resolve-media-download",
        "local-bot-api-url",
        RESOLVE_MEDIA_ANCHOR,
        lines(&[
            "\tif (!file.file_path) throw new Error(\"Telegram getFile returned no file_path\");",
            "\tconst fetchImpl = proxyFetch ?? globalThis.fetch;",
            "\tif (!fetchImpl) throw new Error(\"fetch is not available; set channels.telegram.proxy in config\");",
            "\tconst saved = await downloadAndSaveTelegramFile(file.file_path, fetchImpl);",
        ]),
        lines(&[
            "\tif (!filePath) throw new Error(\"Telegram getFile returned no file_path\");",
            "\tconst saved = await downloadAndSaveTelegramFile(filePath, fetchImpl);",
        ]),
    )
    .marker("if (!filePath) throw new Error(\"Telegram getFile returned no file_path\");")
    .describe("download the main media file from the resolved path");

    let call_sites = Rule::new(
        "resolve-media-call-sites",
        "local-bot-api-url",
        "resolveMedia(ctx, mediaMaxBytes",
        "resolveMedia(ctx, mediaMaxBytes, opts.token, opts.proxyFetch)",
        "resolveMedia(ctx, mediaMaxBytes, opts.token, opts.proxyFetch, telegramCfg.localBotApiUrl)",
    )
    .marker("resolveMedia(ctx, mediaMaxBytes, opts.token, opts.proxyFetch, telegramCfg.localBotApiUrl)")
    .repeating()
    .describe("pass telegramCfg.localBotApiUrl at every resolveMedia call site");

    vec![
        signature,
        get_file_path,
        sticker,
        media_lookup,
        media_download,
        call_sites,
    ]
}

/// The injection point sits inside a handler whose nesting depth differs
/// between bundles; one candidate per known depth.
fn file_id_injection() -> Rule {
    let (search, replacement) = file_id_block("\t");
    let (nested_search, nested_replacement) = file_id_block("\t\t");

    Rule::new(
        "inject-large-file-id",
        "file-id-injection",
        "throw mediaErr;",
        search,
        replacement,
    )
    .variant(nested_search, nested_replacement)
    .marker(MARKER_FILE_ID)
    .describe("tag messages with the file_id of media that could not be downloaded")
}

fn file_id_block(indent: &str) -> (String, String) {
    let search = format!(
        "{indent}\t\tthrow mediaErr;\n{indent}\t}}\n{indent}\tconst hasText = Boolean((msg.text ?? msg.caption ?? \"\").trim());"
    );

    let t = format!("{indent}\t");
    let t2 = format!("{t}\t");
    let t3 = format!("{t2}\t");
    let replacement = lines(&[
        &format!("{t}\tthrow mediaErr;"),
        &format!("{t}}}"),
        &format!("{t}{MARKER_FILE_ID}"),
        &format!("{t}if (!media) {{"),
        &format!("{t2}const _mo = msg.photo?.[msg.photo.length - 1] ?? msg.video ?? msg.video_note ?? msg.document ?? msg.audio ?? msg.voice;"),
        &format!("{t2}if (_mo?.file_id) {{"),
        &format!("{t3}const _fi = JSON.stringify({{"),
        &format!("{t3}\tfile_id: _mo.file_id,"),
        &format!("{t3}\tfile_size: _mo.file_size ?? msg.document?.file_size ?? msg.video?.file_size ?? msg.audio?.file_size ?? 0,"),
        &format!("{t3}\tfile_name: msg.document?.file_name ?? msg.audio?.file_name ?? msg.video?.file_name ?? \"\","),
        &format!("{t3}\tmime_type: msg.document?.mime_type ?? msg.audio?.mime_type ?? msg.video?.mime_type ?? \"\""),
        &format!("{t3}}});"),
        &format!("{t3}const _tag = \"<telegram_large_file>\" + _fi + \"</telegram_large_file>\";"),
        &format!("{t3}const _et = (msg.text ?? msg.caption ?? \"\").trim();"),
        &format!("{t3}if (msg.caption !== void 0) msg.caption = _et ? _et + \"\\n\" + _tag : _tag;"),
        &format!("{t3}else msg.text = (_et ? _et + \"\\n\" + _tag : _tag);"),
        &format!("{t2}}}"),
        &format!("{t}}}"),
        &format!("{t}const hasText = Boolean((msg.text ?? msg.caption ?? \"\").trim());"),
    ]);

    (search, replacement)
}
