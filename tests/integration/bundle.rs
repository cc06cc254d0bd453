//! Mock OpenClaw dist chunks, shaped like the bundler output the built-in
//! catalog targets.

pub fn lines(parts: &[&str]) -> String {
    let mut out = parts.join("\n");
    out.push('\n');
    out
}

/// Telegram channel config schema chunk.
pub fn config_chunk() -> String {
    lines(&[
        "const TelegramAccountSchema = z.object({",
        "\tbotToken: z.string().optional(),",
        "\tmediaMaxMb: z.number().positive().optional(),",
        "\ttimeoutSeconds: z.number().int().positive().optional()",
        "});",
    ])
}

/// `resolveMedia`, its call sites, and the message handler that rethrows
/// download errors.
pub fn media_chunk() -> String {
    lines(&[
        "async function resolveMedia(ctx, maxBytes, token, proxyFetch) {",
        "\tconst msg = ctx.message;",
        "\tconst downloadAndSaveTelegramFile = async (filePath, fetchImpl) => {",
        "\t\tconst fetched = await fetchRemoteMedia({",
        "\t\t\turl: `https://api.telegram.org/file/bot${token}/${filePath}`,",
        "\t\t\tfetchImpl,",
        "\t\t\tfilePathHint: filePath",
        "\t\t});",
        "\t\tconst originalName = fetched.fileName ?? filePath;",
        "\t\treturn saveMediaBuffer(fetched.buffer, fetched.contentType, \"inbound\", maxBytes, originalName);",
        "\t};",
        "\tif (msg.sticker) {",
        "\t\tconst sticker = msg.sticker;",
        "\t\ttry {",
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
        "\t\t\treturn { path: saved.path, contentType: saved.contentType };",
        "\t\t} catch (err) {",
        "\t\t\tlogVerbose(`telegram: sticker download failed: ${String(err)}`);",
        "\t\t\treturn null;",
        "\t\t}",
        "\t}",
        "\tif (!(msg.photo?.[msg.photo.length - 1] ?? msg.video ?? msg.video_note ?? msg.document ?? msg.audio ?? msg.voice)?.file_id) return null;",
        "\tlet file;",
        "\ttry {",
        "\t\tfile = await retryAsync(() => ctx.getFile(), {",
        "\t\t\tattempts: 3,",
        "\t\t\tlabel: \"telegram:getFile\"",
        "\t\t});",
        "\t} catch (err) {",
        "\t\tthrow err;",
        "\t}",
        "\tif (!file.file_path) throw new Error(\"Telegram getFile returned no file_path\");",
        "\tconst fetchImpl = proxyFetch ?? globalThis.fetch;",
        "\tif (!fetchImpl) throw new Error(\"fetch is not available; set channels.telegram.proxy in config\");",
        "\tconst saved = await downloadAndSaveTelegramFile(file.file_path, fetchImpl);",
        "\treturn { path: saved.path, contentType: saved.contentType };",
        "}",
        "function registerTelegramHandlers(bot, opts, telegramCfg, mediaMaxBytes) {",
        "\tconst handleMessage = async (ctx) => {",
        "\t\tconst msg = ctx.message;",
        "\t\tlet media = null;",
        "\t\ttry {",
        "\t\t\tmedia = await resolveMedia(ctx, mediaMaxBytes, opts.token, opts.proxyFetch);",
        "\t\t} catch (mediaErr) {",
        "\t\t\tthrow mediaErr;",
        "\t\t}",
        "\t\tconst hasText = Boolean((msg.text ?? msg.caption ?? \"\").trim());",
        "\t\treturn { media, hasText };",
        "\t};",
        "\tbot.on(\"message\", handleMessage);",
        "\tbot.on(\"channel_post\", async (ctx) => resolveMedia(ctx, mediaMaxBytes, opts.token, opts.proxyFetch));",
        "}",
    ])
}

/// A handler bundled one block deeper than in [`media_chunk`].
pub fn nested_handler_chunk() -> String {
    lines(&[
        "function registerEditedHandlers(bot) {",
        "\tbot.on(\"edited_message\", async (ctx) => {",
        "\t\tconst handle = async () => {",
        "\t\t\ttry {",
        "\t\t\t\tawait ctx.reply(\"ok\");",
        "\t\t\t} catch (mediaErr) {",
        "\t\t\t\tthrow mediaErr;",
        "\t\t\t}",
        "\t\t\tconst hasText = Boolean((msg.text ?? msg.caption ?? \"\").trim());",
        "\t\t};",
        "\t\treturn handle();",
        "\t});",
        "}",
    ])
}

/// Unrelated chunk no rule touches.
pub fn vendor_chunk() -> String {
    lines(&["export function noop() {", "\treturn undefined;", "}"])
}
