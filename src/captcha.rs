//! Heuristic CAPTCHA detection. Read-only; nothing here interacts with the
//! challenge.

use crate::dom::page::{FrameContent, NodeId, PageModel};
use crate::dom::state::{CaptchaDetection, CaptchaEvidence};

const IFRAME_WEIGHT: f64 = 0.7;
const SELECTOR_WEIGHT: f64 = 0.5;
const SCRIPT_WEIGHT: f64 = 0.5;
const TEXT_WEIGHT: f64 = 0.3;
const URL_WEIGHT: f64 = 0.2;

const IFRAME_FLOOR: f64 = 0.8;
const TEXT_ONLY_CAP: f64 = 0.4;
pub const DETECTION_THRESHOLD: f64 = 0.7;
const MAX_EVIDENCE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Recaptcha,
    Hcaptcha,
    Turnstile,
    Arkose,
    AwsWaf,
}

impl Provider {
    /// Tie-break order when several providers have signals.
    pub const PRIORITY: [Provider; 5] = [
        Provider::Recaptcha,
        Provider::Hcaptcha,
        Provider::Turnstile,
        Provider::Arkose,
        Provider::AwsWaf,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Recaptcha => "recaptcha",
            Provider::Hcaptcha => "hcaptcha",
            Provider::Turnstile => "turnstile",
            Provider::Arkose => "arkose",
            Provider::AwsWaf => "awswaf",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

const IFRAME_HINTS: &[(&str, Provider)] = &[
    ("google.com/recaptcha", Provider::Recaptcha),
    ("recaptcha.net", Provider::Recaptcha),
    ("gstatic.com/recaptcha", Provider::Recaptcha),
    ("hcaptcha.com", Provider::Hcaptcha),
    ("challenges.cloudflare.com", Provider::Turnstile),
    ("arkoselabs.com", Provider::Arkose),
    ("funcaptcha.com", Provider::Arkose),
    ("awswaf.com", Provider::AwsWaf),
];

const SCRIPT_HINTS: &[(&str, Provider)] = &[
    ("recaptcha/api.js", Provider::Recaptcha),
    ("recaptcha/enterprise.js", Provider::Recaptcha),
    ("hcaptcha.com/1/api.js", Provider::Hcaptcha),
    ("challenges.cloudflare.com/turnstile", Provider::Turnstile),
    ("arkoselabs.com", Provider::Arkose),
    ("captcha.awswaf.com", Provider::AwsWaf),
];

#[derive(Debug, Clone, Copy)]
enum SelectorHint {
    Class(&'static str),
    Id(&'static str),
    Attr(&'static str),
    Name(&'static str),
}

impl SelectorHint {
    fn matches(self, page: &PageModel, id: NodeId) -> bool {
        let node = page.node(id);
        match self {
            SelectorHint::Class(class) => node.class_tokens().any(|c| c == class),
            SelectorHint::Id(dom_id) => node.attr("id") == Some(dom_id),
            SelectorHint::Attr(name) => node.has_attr(name),
            SelectorHint::Name(name) => node.attr("name") == Some(name),
        }
    }

    fn css(self) -> String {
        match self {
            SelectorHint::Class(class) => format!(".{}", class),
            SelectorHint::Id(dom_id) => format!("#{}", dom_id),
            SelectorHint::Attr(name) => format!("[{}]", name),
            SelectorHint::Name(name) => format!("[name=\"{}\"]", name),
        }
    }
}

const SELECTOR_HINTS: &[(SelectorHint, Option<Provider>)] = &[
    (SelectorHint::Class("g-recaptcha"), Some(Provider::Recaptcha)),
    (SelectorHint::Name("g-recaptcha-response"), Some(Provider::Recaptcha)),
    (SelectorHint::Class("h-captcha"), Some(Provider::Hcaptcha)),
    (SelectorHint::Name("h-captcha-response"), Some(Provider::Hcaptcha)),
    (SelectorHint::Class("cf-turnstile"), Some(Provider::Turnstile)),
    (SelectorHint::Name("cf-turnstile-response"), Some(Provider::Turnstile)),
    (SelectorHint::Id("FunCaptcha"), Some(Provider::Arkose)),
    (SelectorHint::Id("captcha-container"), Some(Provider::AwsWaf)),
    (SelectorHint::Class("captcha"), None),
    (SelectorHint::Attr("data-sitekey"), None),
];

const TEXT_HINTS: &[&str] = &[
    "verify you are human",
    "i'm not a robot",
    "i am not a robot",
    "are you a robot",
    "complete the captcha",
    "complete the security check",
    "press and hold",
    "unusual traffic",
];

const URL_HINTS: &[&str] = &["captcha", "/challenge", "cdn-cgi/challenge-platform", "/sorry/"];

#[derive(Default)]
struct Signals {
    evidence: CaptchaEvidence,
    provider_counts: [u32; 5],
    score: f64,
    iframe_hit: bool,
    structural_hit: bool,
    text_hit: bool,
}

fn push_capped(list: &mut Vec<String>, value: String) {
    if list.len() < MAX_EVIDENCE && !list.contains(&value) {
        list.push(value);
    }
}

impl Signals {
    fn credit(&mut self, provider: Option<Provider>) {
        if let Some(provider) = provider {
            self.provider_counts[provider.index()] += 1;
        }
    }

    fn scan_document(&mut self, page: &PageModel, seen_selectors: &mut Vec<usize>) {
        for id in page.node_ids() {
            let node = page.node(id);
            if node.is_text() {
                continue;
            }
            match node.tag.as_str() {
                "iframe" | "frame" => {
                    let src = node.attr("src").unwrap_or("");
                    if let Some((_, provider)) = IFRAME_HINTS.iter().find(|(hint, _)| src.contains(hint)) {
                        self.score += IFRAME_WEIGHT;
                        self.iframe_hit = true;
                        self.credit(Some(*provider));
                        push_capped(&mut self.evidence.iframe_src_hits, src.to_string());
                    }
                    if let Some(FrameContent::SameOrigin(child)) = &node.frame {
                        self.scan_document(child, seen_selectors);
                    }
                }
                "script" => {
                    let src = node.attr("src").unwrap_or("");
                    if let Some((hint, provider)) = SCRIPT_HINTS.iter().find(|(hint, _)| src.contains(hint)) {
                        self.score += SCRIPT_WEIGHT;
                        self.structural_hit = true;
                        self.credit(Some(*provider));
                        push_capped(
                            &mut self.evidence.selector_hits,
                            format!("script[src*=\"{}\"]", hint),
                        );
                    }
                }
                _ => {}
            }

            // Each selector hint scores once per page, however many nodes match.
            for (index, (hint, provider)) in SELECTOR_HINTS.iter().enumerate() {
                if seen_selectors.contains(&index) || !hint.matches(page, id) {
                    continue;
                }
                seen_selectors.push(index);
                self.score += SELECTOR_WEIGHT;
                self.structural_hit = true;
                self.credit(*provider);
                push_capped(&mut self.evidence.selector_hits, hint.css());
            }
        }
    }

    fn scan_text(&mut self, page: &PageModel) {
        let body = page
            .node_ids()
            .find(|id| page.node(*id).tag == "body")
            .unwrap_or_else(|| page.root());
        let text = page.inner_text(body).to_lowercase();
        for hint in TEXT_HINTS {
            if text.contains(hint) {
                self.score += TEXT_WEIGHT;
                self.text_hit = true;
                push_capped(&mut self.evidence.text_hits, hint.to_string());
            }
        }
    }

    fn scan_url(&mut self, url: &str) {
        let lower = url.to_lowercase();
        for hint in URL_HINTS {
            if lower.contains(hint) {
                self.score += URL_WEIGHT;
                self.structural_hit = true;
                push_capped(&mut self.evidence.url_hits, hint.to_string());
            }
        }
    }
}

pub fn detect(page: &PageModel) -> CaptchaDetection {
    let mut signals = Signals::default();
    let mut seen_selectors = Vec::new();
    signals.scan_document(page, &mut seen_selectors);
    signals.scan_text(page);
    signals.scan_url(&page.url);

    let mut confidence = signals.score.min(1.0);
    if signals.iframe_hit {
        confidence = confidence.max(IFRAME_FLOOR);
    }
    if signals.text_hit && !signals.iframe_hit && !signals.structural_hit {
        confidence = confidence.min(TEXT_ONLY_CAP);
    }
    let detected = confidence >= DETECTION_THRESHOLD;

    let provider_hint = Provider::PRIORITY
        .iter()
        .find(|provider| signals.provider_counts[provider.index()] > 0)
        .map(|provider| provider.as_str().to_string())
        .or_else(|| detected.then(|| "unknown".to_string()));

    CaptchaDetection {
        detected,
        provider_hint,
        confidence,
        evidence: signals.evidence,
    }
}
