//! Login-state detection from page markup.
//!
//! The forum has no session-validity API, so state is read off the HTML.
//! Each check is a named [`Predicate`]; a [`LoginStateDetector`] evaluates its
//! predicates in priority order and the first one that fires decides. When
//! none fires the page is treated as logged out.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use scraper::{ElementRef, Html, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    LoggedIn,
    LoggedOut,
}

/// Why a page was classified the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub state: LoginState,
    /// Name of the predicate that fired, `None` for the default verdict
    pub rule: Option<&'static str>,
}

impl Detection {
    pub fn is_logged_in(&self) -> bool {
        self.state == LoginState::LoggedIn
    }
}

/// A single named check against a parsed page.
#[derive(Clone, Copy)]
pub struct Predicate {
    pub name: &'static str,
    pub verdict: LoginState,
    test: fn(&Html, &str) -> bool,
}

impl Predicate {
    pub const fn new(
        name: &'static str,
        verdict: LoginState,
        test: fn(&Html, &str) -> bool,
    ) -> Self {
        Self {
            name,
            verdict,
            test,
        }
    }

    pub fn fires(&self, page: &Html, username: &str) -> bool {
        (self.test)(page, username)
    }
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predicate")
            .field("name", &self.name)
            .field("verdict", &self.verdict)
            .finish()
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static LOGIN_FORM: Lazy<Selector> =
    Lazy::new(|| selector(r#"form#login, form[action*="mode=login"]"#));
static LOGOUT_LINK: Lazy<Selector> = Lazy::new(|| selector(r#"a[href*="logout"]"#));
static ANCHORS: Lazy<Selector> = Lazy::new(|| selector("a"));
static NAME_HOLDERS: Lazy<Selector> = Lazy::new(|| selector("span, div, a, strong, li"));
static ERROR_BOXES: Lazy<Selector> = Lazy::new(|| selector("div.error, div.alert, p.error"));

static FAILURE_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)login.{0,20}failed|access.{0,10}denied|(?:incorrect|invalid|wrong).{0,20}(?:password|username|credentials)|password.{0,20}(?:errata|non valida)")
        .unwrap()
});
static CREDENTIALS_REFUSED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:incorrect|invalid|wrong).{0,20}(?:password|username|credentials)|password.{0,20}(?:errata|non valida)|nome utente.{0,20}non valido")
        .unwrap()
});
static CREDENTIAL_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)login|password|username|nome utente").unwrap());
static LOGOUT_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:logout|log out|esci)\b").unwrap());
static WELCOME_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)welcome back|benvenuto|logged in as|sei connesso").unwrap());

/// Text nodes that are direct children of an element.
fn own_text(el: ElementRef<'_>) -> String {
    el.children()
        .filter_map(|child| child.value().as_text().map(|t| t.trim().to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn page_text(page: &Html) -> String {
    page.root_element().text().collect::<Vec<_>>().join(" ")
}

fn login_form_present(page: &Html, _username: &str) -> bool {
    page.select(&LOGIN_FORM).next().is_some()
}

fn logout_link_present(page: &Html, _username: &str) -> bool {
    page.select(&LOGOUT_LINK).next().is_some()
}

fn logout_text_present(page: &Html, _username: &str) -> bool {
    page.select(&ANCHORS)
        .any(|a| LOGOUT_TEXT.is_match(&a.text().collect::<String>()))
}

fn username_present(page: &Html, username: &str) -> bool {
    let needle = username.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    page.select(&NAME_HOLDERS)
        .any(|el| own_text(el).to_lowercase().contains(&needle))
}

fn welcome_text_present(page: &Html, _username: &str) -> bool {
    WELCOME_TEXT.is_match(&page_text(page))
}

fn failure_text_present(page: &Html, _username: &str) -> bool {
    FAILURE_TEXT.is_match(&page_text(page))
}

fn credential_error_box(page: &Html, _username: &str) -> bool {
    page.select(&ERROR_BOXES)
        .any(|el| CREDENTIAL_HINT.is_match(&el.text().collect::<String>()))
}

pub const LOGIN_FORM_PRESENT: Predicate =
    Predicate::new("login_form_present", LoginState::LoggedOut, login_form_present);
pub const LOGOUT_LINK_PRESENT: Predicate =
    Predicate::new("logout_link_present", LoginState::LoggedIn, logout_link_present);
pub const LOGOUT_TEXT_PRESENT: Predicate =
    Predicate::new("logout_text_present", LoginState::LoggedIn, logout_text_present);
pub const USERNAME_PRESENT: Predicate =
    Predicate::new("username_present", LoginState::LoggedIn, username_present);
pub const WELCOME_TEXT_PRESENT: Predicate =
    Predicate::new("welcome_text_present", LoginState::LoggedIn, welcome_text_present);
pub const FAILURE_TEXT_PRESENT: Predicate =
    Predicate::new("failure_text_present", LoginState::LoggedOut, failure_text_present);
pub const CREDENTIAL_ERROR_BOX: Predicate =
    Predicate::new("credential_error_box", LoginState::LoggedOut, credential_error_box);

/// Ordered predicate list with a logged-out default.
#[derive(Debug, Clone)]
pub struct LoginStateDetector {
    predicates: Vec<Predicate>,
}

impl LoginStateDetector {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    /// Rules for the lightweight probe of a regular page.
    pub fn probe() -> Self {
        Self::new(vec![LOGIN_FORM_PRESENT, LOGOUT_LINK_PRESENT, USERNAME_PRESENT])
    }

    /// Rules for the page returned by a login form submission.
    ///
    /// Explicit failure signals outrank everything; the success side is broader
    /// than [`LoginStateDetector::probe`] because the post-login page varies.
    pub fn login_response() -> Self {
        Self::new(vec![
            FAILURE_TEXT_PRESENT,
            CREDENTIAL_ERROR_BOX,
            LOGIN_FORM_PRESENT,
            LOGOUT_LINK_PRESENT,
            LOGOUT_TEXT_PRESENT,
            USERNAME_PRESENT,
            WELCOME_TEXT_PRESENT,
        ])
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn evaluate(&self, html: &str, username: &str) -> Detection {
        let page = Html::parse_document(html);
        self.predicates
            .iter()
            .find(|p| p.fires(&page, username))
            .map(|p| Detection {
                state: p.verdict,
                rule: Some(p.name),
            })
            .unwrap_or(Detection {
                state: LoginState::LoggedOut,
                rule: None,
            })
    }
}

/// Whether the page offers a login form, i.e. the session is gone.
pub fn has_login_form(html: &str) -> bool {
    login_form_present(&Html::parse_document(html), "")
}

/// Whether a failed login page says the credentials themselves were refused.
pub fn credentials_rejected(html: &str) -> bool {
    let page = Html::parse_document(html);
    CREDENTIALS_REFUSED.is_match(&page_text(&page))
}

/// The login form as found on the login page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub action: Option<String>,
    /// Hidden and default fields in document order
    pub fields: Vec<(String, String)>,
}

static LOGIN_FORM_INPUTS: Lazy<Selector> = Lazy::new(|| selector("input"));

/// Locate the login form and collect the fields a browser would submit.
///
/// Checkboxes are only included when checked; submit buttons are skipped
/// because the caller adds its own `login` field.
pub fn parse_login_form(html: &str) -> Option<LoginForm> {
    let page = Html::parse_document(html);
    let form = page.select(&LOGIN_FORM).next()?;

    let fields = form
        .select(&LOGIN_FORM_INPUTS)
        .filter_map(|input| {
            let el = input.value();
            let name = el.attr("name")?.to_string();
            let kind = el.attr("type").unwrap_or("text").to_ascii_lowercase();
            match kind.as_str() {
                "submit" | "button" | "image" => None,
                "checkbox" | "radio" => el
                    .attr("checked")
                    .map(|_| (name, el.attr("value").unwrap_or("on").to_string())),
                _ => Some((name, el.attr("value").unwrap_or("").to_string())),
            }
        })
        .collect();

    Some(LoginForm {
        action: form.value().attr("action").map(str::to_string),
        fields,
    })
}
