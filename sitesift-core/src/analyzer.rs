// Page analyzers: markup checks and selector-based custom rules

use crate::browser::Page;
use crate::data::{Category, Confidence, Evidence, Finding, Severity, Viewport};
use crate::error::{BrowserError, ConfigError};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

const SNIPPET_CHARS: usize = 200;

#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    /// Findings for one page at one viewport. A single malformed element is
    /// skipped, never reported as an error.
    async fn analyze(
        &self,
        page: &dyn Page,
        page_url: &str,
        viewport: &Viewport,
    ) -> Result<Vec<Finding>, BrowserError>;
}

/// Where a check is running; stamped onto every finding it produces.
struct CheckContext<'a> {
    tool: &'a str,
    page_url: &'a str,
    viewport: &'a Viewport,
}

impl CheckContext<'_> {
    fn finding(
        &self,
        rule_id: &str,
        category: Category,
        severity: Severity,
        title: &str,
        description: String,
    ) -> Finding {
        Finding::new(
            self.tool,
            rule_id,
            category,
            severity,
            self.page_url,
            &self.viewport.name,
            title,
            description,
        )
    }
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static IMG: LazyLock<Selector> = LazyLock::new(|| selector("img"));
static BUTTON: LazyLock<Selector> = LazyLock::new(|| selector("button"));
static FORM_CONTROL: LazyLock<Selector> = LazyLock::new(|| selector("input, select, textarea"));
static LABEL_FOR: LazyLock<Selector> = LazyLock::new(|| selector("label[for]"));
static HTML: LazyLock<Selector> = LazyLock::new(|| selector("html"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static IMG_WITH_ALT: LazyLock<Selector> = LazyLock::new(|| selector("img[alt]"));
static META_VIEWPORT: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[name="viewport"]"#));

/// Builds a selector path for an element: the nearest ancestor id anchors it,
/// everything below is positional.
pub fn css_path(element: ElementRef) -> String {
    let mut parts = Vec::new();
    let mut current = Some(element);

    while let Some(el) = current {
        let name = el.value().name();
        if let Some(id) = el.value().id() {
            parts.push(format!("{}#{}", name, id));
            break;
        }
        if name == "html" || name == "body" {
            parts.push(name.to_string());
            break;
        }
        let position = el
            .prev_siblings()
            .filter(|n| n.value().is_element())
            .count()
            + 1;
        parts.push(format!("{}:nth-child({})", name, position));
        current = el.parent().and_then(ElementRef::wrap);
    }

    parts.reverse();
    parts.join(" > ")
}

fn snippet(element: ElementRef) -> String {
    let html = element.html();
    if html.chars().count() <= SNIPPET_CHARS {
        html
    } else {
        let mut cut: String = html.chars().take(SNIPPET_CHARS).collect();
        cut.push('…');
        cut
    }
}

fn evidence_for(element: ElementRef) -> Evidence {
    Evidence {
        selectors: vec![css_path(element)],
        dom_snippet: Some(snippet(element)),
        screenshot_path: None,
    }
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn has_accessible_name_attr(element: ElementRef) -> bool {
    ["aria-label", "aria-labelledby", "title"]
        .iter()
        .any(|attr| element.value().attr(attr).is_some_and(|v| !v.trim().is_empty()))
}

fn check_image_alt(doc: &Html, ctx: &CheckContext) -> Vec<Finding> {
    let mut findings = Vec::new();

    for img in doc.select(&IMG) {
        let attrs = img.value();
        if attrs.attr("alt").is_some() || attrs.attr("role") == Some("presentation") {
            continue;
        }
        if has_accessible_name_attr(img) {
            continue;
        }
        let src = attrs.attr("src").unwrap_or("(inline)");
        let mut finding = ctx.finding(
            "image-alt",
            Category::Accessibility,
            Severity::Critical,
            "Image without alternative text",
            format!("The image {} has no alt attribute, so screen readers cannot describe it.", src),
        );
        finding.confidence = Confidence::Certain;
        finding.evidence = evidence_for(img);
        finding.suggested_fix = Some(
            "Add a descriptive alt attribute, or alt=\"\" if the image is decorative.".to_string(),
        );
        findings.push(finding);
    }

    findings
}

fn check_button_name(doc: &Html, ctx: &CheckContext) -> Vec<Finding> {
    let mut findings = Vec::new();

    for button in doc.select(&BUTTON) {
        if !text_of(button).is_empty() || has_accessible_name_attr(button) {
            continue;
        }
        let labelled_by_image = button
            .select(&IMG_WITH_ALT)
            .any(|img| img.value().attr("alt").is_some_and(|alt| !alt.trim().is_empty()));
        if labelled_by_image {
            continue;
        }
        let mut finding = ctx.finding(
            "button-name",
            Category::Accessibility,
            Severity::Critical,
            "Button without an accessible name",
            "A button has no text content and no aria-label, so assistive technology announces it as just \"button\".".to_string(),
        );
        finding.confidence = Confidence::Certain;
        finding.evidence = evidence_for(button);
        finding.suggested_fix = Some("Give the button visible text or an aria-label.".to_string());
        findings.push(finding);
    }

    findings
}

fn check_form_labels(doc: &Html, ctx: &CheckContext) -> Vec<Finding> {
    let mut findings = Vec::new();

    let labelled: HashSet<&str> = doc
        .select(&LABEL_FOR)
        .filter_map(|label| label.value().attr("for"))
        .collect();

    for control in doc.select(&FORM_CONTROL) {
        let attrs = control.value();
        if attrs.name() == "input"
            && let Some(kind) = attrs.attr("type")
            && matches!(
                kind.to_ascii_lowercase().as_str(),
                "hidden" | "submit" | "button" | "image" | "reset"
            )
        {
            continue;
        }
        if attrs.id().is_some_and(|id| labelled.contains(id)) || has_accessible_name_attr(control) {
            continue;
        }
        let wrapped = control
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| a.value().name() == "label");
        if wrapped {
            continue;
        }

        let field = attrs.attr("name").unwrap_or(attrs.name());
        let mut finding = ctx.finding(
            "label",
            Category::Accessibility,
            Severity::Critical,
            "Form control without a label",
            format!("The form field '{}' has no associated label.", field),
        );
        finding.evidence = evidence_for(control);
        finding.suggested_fix = Some(
            "Associate a <label for=...> with the field, wrap it in a label, or add aria-label."
                .to_string(),
        );
        findings.push(finding);
    }

    findings
}

fn check_document_language(doc: &Html, ctx: &CheckContext) -> Vec<Finding> {
    let Some(html) = doc.select(&HTML).next() else {
        return Vec::new();
    };
    if html.value().attr("lang").is_some_and(|l| !l.trim().is_empty()) {
        return Vec::new();
    }

    let mut finding = ctx.finding(
        "html-has-lang",
        Category::Accessibility,
        Severity::High,
        "Document language not set",
        "The <html> element has no lang attribute, so screen readers may use the wrong pronunciation.".to_string(),
    );
    finding.confidence = Confidence::Certain;
    finding.evidence.selectors = vec!["html".to_string()];
    finding.suggested_fix = Some("Add a lang attribute, for example <html lang=\"en\">.".to_string());
    vec![finding]
}

fn check_document_title(doc: &Html, ctx: &CheckContext) -> Vec<Finding> {
    let has_title = doc.select(&TITLE).any(|t| !text_of(t).is_empty());
    if has_title {
        return Vec::new();
    }

    let mut finding = ctx.finding(
        "document-title",
        Category::Accessibility,
        Severity::High,
        "Page has no title",
        "The document has no non-empty <title>, which is what browser tabs and screen readers announce first.".to_string(),
    );
    finding.confidence = Confidence::Certain;
    finding.evidence.selectors = vec!["head".to_string()];
    finding.suggested_fix = Some("Add a short, unique <title> to the page.".to_string());
    vec![finding]
}

fn check_link_name(doc: &Html, ctx: &CheckContext) -> Vec<Finding> {
    let mut findings = Vec::new();

    for link in doc.select(&LINK) {
        if !text_of(link).is_empty() || has_accessible_name_attr(link) {
            continue;
        }
        let named_by_image = link
            .select(&IMG_WITH_ALT)
            .any(|img| img.value().attr("alt").is_some_and(|alt| !alt.trim().is_empty()));
        if named_by_image {
            continue;
        }

        let href = link.value().attr("href").unwrap_or_default();
        let mut finding = ctx.finding(
            "link-name",
            Category::Accessibility,
            Severity::High,
            "Link without discernible text",
            format!("The link to '{}' has no text, so its purpose cannot be determined.", href),
        );
        finding.evidence = evidence_for(link);
        finding.suggested_fix = Some("Add link text or an aria-label describing the destination.".to_string());
        findings.push(finding);
    }

    findings
}

fn check_meta_viewport(doc: &Html, ctx: &CheckContext) -> Vec<Finding> {
    // Only matters once the layout has to shrink.
    if ctx.viewport.width >= 1024 || doc.select(&META_VIEWPORT).next().is_some() {
        return Vec::new();
    }

    let mut finding = ctx.finding(
        "meta-viewport",
        Category::Usability,
        Severity::Medium,
        "Missing viewport meta tag",
        format!(
            "Without a viewport meta tag the page renders zoomed out on a {}px wide screen.",
            ctx.viewport.width
        ),
    );
    finding.confidence = Confidence::Likely;
    finding.evidence.selectors = vec!["head".to_string()];
    finding.suggested_fix = Some(
        "Add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">.".to_string(),
    );
    vec![finding]
}

/// Static markup checks over the rendered document.
#[derive(Debug, Default, Clone)]
pub struct MarkupAnalyzer;

impl MarkupAnalyzer {
    pub const NAME: &'static str = "markup";

    pub fn new() -> Self {
        Self
    }

    pub fn check_document(&self, html: &str, page_url: &str, viewport: &Viewport) -> Vec<Finding> {
        let doc = Html::parse_document(html);
        let ctx = CheckContext {
            tool: Self::NAME,
            page_url,
            viewport,
        };

        let mut findings = Vec::new();
        findings.extend(check_image_alt(&doc, &ctx));
        findings.extend(check_button_name(&doc, &ctx));
        findings.extend(check_form_labels(&doc, &ctx));
        findings.extend(check_document_language(&doc, &ctx));
        findings.extend(check_document_title(&doc, &ctx));
        findings.extend(check_link_name(&doc, &ctx));
        findings.extend(check_meta_viewport(&doc, &ctx));
        findings
    }
}

#[async_trait]
impl Analyzer for MarkupAnalyzer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn analyze(
        &self,
        page: &dyn Page,
        page_url: &str,
        viewport: &Viewport,
    ) -> Result<Vec<Finding>, BrowserError> {
        let html = page.content().await?;
        Ok(self.check_document(&html, page_url, viewport))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    /// Every matching element is a finding.
    #[default]
    Forbid,
    /// A page with no matching element is a finding.
    Require,
}

fn default_rule_severity() -> Severity {
    Severity::Medium
}

fn default_rule_category() -> Category {
    Category::Design
}

/// A selector-based design rule loaded from config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRule {
    pub id: String,
    pub selector: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_rule_severity")]
    pub severity: Severity,
    #[serde(default = "default_rule_category")]
    pub category: Category,
    #[serde(default)]
    pub mode: RuleMode,
    /// Viewport names the rule applies to; empty means all.
    #[serde(default)]
    pub viewports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

impl CustomRule {
    fn applies_to(&self, viewport: &Viewport) -> bool {
        self.viewports.is_empty() || self.viewports.iter().any(|v| v.eq_ignore_ascii_case(&viewport.name))
    }
}

struct CompiledRule {
    rule: CustomRule,
    selector: Selector,
}

pub struct CustomRuleAnalyzer {
    rules: Vec<CompiledRule>,
}

impl CustomRuleAnalyzer {
    pub const NAME: &'static str = "custom-rules";

    /// Compiles every rule up front; any bad rule rejects the whole set.
    pub fn new(rules: Vec<CustomRule>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(rules.len());

        for (index, rule) in rules.into_iter().enumerate() {
            if rule.id.trim().is_empty() {
                return Err(ConfigError::EmptyRuleId { index });
            }
            if !seen.insert(rule.id.clone()) {
                return Err(ConfigError::DuplicateRule(rule.id));
            }
            let selector = Selector::parse(&rule.selector).map_err(|e| ConfigError::InvalidSelector {
                rule: rule.id.clone(),
                selector: rule.selector.clone(),
                reason: e.to_string(),
            })?;
            compiled.push(CompiledRule { rule, selector });
        }

        Ok(Self { rules: compiled })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn check_document(&self, html: &str, page_url: &str, viewport: &Viewport) -> Vec<Finding> {
        let doc = Html::parse_document(html);
        let ctx = CheckContext {
            tool: Self::NAME,
            page_url,
            viewport,
        };

        let mut findings = Vec::new();
        for CompiledRule { rule, selector } in &self.rules {
            if !rule.applies_to(viewport) {
                continue;
            }
            let description = if rule.description.is_empty() {
                rule.title.clone()
            } else {
                rule.description.clone()
            };

            match rule.mode {
                RuleMode::Forbid => {
                    for element in doc.select(selector) {
                        let mut finding =
                            ctx.finding(&rule.id, rule.category, rule.severity, &rule.title, description.clone());
                        finding.confidence = Confidence::Certain;
                        finding.evidence = evidence_for(element);
                        finding.suggested_fix = rule.suggested_fix.clone();
                        findings.push(finding);
                    }
                }
                RuleMode::Require => {
                    if doc.select(selector).next().is_none() {
                        let mut finding =
                            ctx.finding(&rule.id, rule.category, rule.severity, &rule.title, description);
                        finding.confidence = Confidence::Certain;
                        finding.evidence.selectors = vec![rule.selector.clone()];
                        finding.suggested_fix = rule.suggested_fix.clone();
                        findings.push(finding);
                    }
                }
            }
        }
        findings
    }
}

#[async_trait]
impl Analyzer for CustomRuleAnalyzer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn analyze(
        &self,
        page: &dyn Page,
        page_url: &str,
        viewport: &Viewport,
    ) -> Result<Vec<Finding>, BrowserError> {
        if self.rules.is_empty() {
            return Ok(Vec::new());
        }
        let html = page.content().await?;
        Ok(self.check_document(&html, page_url, viewport))
    }
}
