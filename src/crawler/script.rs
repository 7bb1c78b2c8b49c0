//! Recovers the structured payload a page embeds as a JavaScript assignment.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use rquickjs::{Context, Ctx, Runtime};
use scraper::{Html, Selector};

use super::payload::RawNovelInfo;
use crate::error::{Error, Result};

static INFO_SCRIPT_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^window\.__DATA__").expect("valid marker regex"));
static SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("valid script selector"));

const SEED: &str = "var window = {__DATA__:{}};";
const MEMORY_LIMIT: usize = 64 * 1024 * 1024;
const STACK_LIMIT: usize = 1024 * 1024;
const TIME_LIMIT: Duration = Duration::from_secs(5);

/// Body of the first `<script>` that starts with the `window.__DATA__` marker.
pub fn find_info_script(document: &Html) -> Option<String> {
    document
        .select(&SCRIPT_SELECTOR)
        .map(|script| script.inner_html())
        .map(|body| body.trim().to_string())
        .find(|body| INFO_SCRIPT_START.is_match(body))
}

/// Runs `script` against an empty `window.__DATA__` and returns the object as JSON.
///
/// The interpreter has no modules, no filesystem and no network; it is also
/// bounded in memory, stack depth and wall-clock time. `None` means the script
/// left nothing behind.
pub fn evaluate_to_json(script: &str) -> Result<Option<String>> {
    let runtime = Runtime::new().map_err(|e| Error::Script(e.to_string()))?;
    runtime.set_memory_limit(MEMORY_LIMIT);
    runtime.set_max_stack_size(STACK_LIMIT);
    let deadline = Instant::now() + TIME_LIMIT;
    runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() > deadline)));

    let context = Context::full(&runtime).map_err(|e| Error::Script(e.to_string()))?;
    let json = context
        .with(|ctx| evaluate(&ctx, script).map_err(|e| describe(&ctx, e)))
        .map_err(Error::Script)?;

    Ok(json.filter(|json| {
        let json = json.trim();
        !json.is_empty() && json != "null"
    }))
}

fn evaluate(ctx: &Ctx<'_>, script: &str) -> rquickjs::Result<Option<String>> {
    ctx.eval::<(), _>(SEED)?;
    ctx.eval::<(), _>(script)?;
    ctx.eval::<Option<String>, _>("JSON.stringify(window.__DATA__)")
}

fn describe(ctx: &Ctx<'_>, error: rquickjs::Error) -> String {
    if !error.is_exception() {
        return error.to_string();
    }
    let thrown = ctx.catch();
    thrown
        .as_exception()
        .and_then(|exception| exception.message())
        .unwrap_or_else(|| error.to_string())
}

/// Finds and evaluates the info script, then decodes it.
///
/// `Ok(None)` when the page carries no script or the script yields no data.
pub fn extract_novel_info(document: &Html) -> Result<Option<RawNovelInfo>> {
    let Some(script) = find_info_script(document) else {
        tracing::debug!("no info script on page");
        return Ok(None);
    };
    let Some(json) = evaluate_to_json(&script)? else {
        tracing::debug!("info script produced no data");
        return Ok(None);
    };
    Ok(Some(serde_json::from_str(&json)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<html><head>
        <script>var analytics = 1;</script>
        <script>
            window.__DATA__ = {"manga": {"name": "Имя", "slug": "my-novel", "engName": "My Novel"},
                "chapters": {"list": [{"chapter_number": "1", "chapter_volume": 1, "branch_id": null}], "branches": []}};
            window._SITE_COLOR_ = "#fff";
        </script>
    </head><body></body></html>"##;

    #[test]
    fn finds_marker_script_case_insensitively() {
        let document = Html::parse_document(
            "<script> WINDOW.__data__ = 1; </script><script>window.__DATA__ = {}</script>",
        );
        assert_eq!(find_info_script(&document).unwrap(), "WINDOW.__data__ = 1;");
    }

    #[test]
    fn missing_script_yields_none() {
        let document = Html::parse_document("<script>var x = 1;</script>");
        assert!(find_info_script(&document).is_none());
        assert!(extract_novel_info(&document).unwrap().is_none());
    }

    #[test]
    fn evaluates_payload_into_raw_info() {
        let document = Html::parse_document(PAGE);
        let info = extract_novel_info(&document).unwrap().unwrap();
        assert_eq!(info.manga.slug, "my-novel");
        assert_eq!(info.manga.display_name(), "My Novel");
        assert_eq!(info.chapters.list.len(), 1);
        assert_eq!(info.chapters.list[0].chapter_volume, "1");
    }

    #[test]
    fn script_built_objects_are_serialized() {
        let json = evaluate_to_json(
            "window.__DATA__.manga = {slug: ['a', 'b'].join('-')}; window.__DATA__.n = 1 + 1;",
        )
        .unwrap()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["manga"]["slug"], "a-b");
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn undefined_data_yields_none() {
        assert!(evaluate_to_json("window.__DATA__ = undefined;").unwrap().is_none());
        assert!(evaluate_to_json("window.__DATA__ = null;").unwrap().is_none());
    }

    #[test]
    fn throwing_script_is_a_script_error() {
        let err = evaluate_to_json("throw new Error('boom');").unwrap_err();
        assert!(matches!(err, Error::Script(ref message) if message.contains("boom")));
    }

    #[test]
    fn runaway_script_is_interrupted() {
        let err = evaluate_to_json("while (true) {}").unwrap_err();
        assert!(matches!(err, Error::Script(_)));
    }

    #[test]
    fn sandbox_has_no_host_io() {
        let json = evaluate_to_json(
            "window.__DATA__ = {fetch: typeof fetch, require: typeof require, std: typeof std};",
        )
        .unwrap()
        .unwrap();
        assert_eq!(json, r#"{"fetch":"undefined","require":"undefined","std":"undefined"}"#);
    }
}
