use boa_engine::{Context, Source};
use reset_redirect::{
    link::{ResetRequest, TokenSource},
    page::Page,
    RedirectConfig,
};
use serde_json::Value;
use url::{form_urlencoded, Url};

use crate::common::query_pairs;

/// Just enough of a browser for the page script: `location`, the three
/// elements it looks up, `createElement`, `setTimeout` and `URLSearchParams`.
const DOM: &str = r#"
var navigated = null;
var timers = [];

function Element(tag, id) {
  this.tagName = tag;
  this.id = id;
  this.href = '';
  this.className = '';
  this.textContent = '';
  this.children = [];
}
Element.prototype.appendChild = function (child) {
  this.children.push(child);
  return child;
};
Object.defineProperty(Element.prototype, 'innerHTML', {
  get: function () { return ''; },
  set: function (value) { this.children = []; }
});

var elements = {
  'container': new Element('div', 'container'),
  'fallback': new Element('p', 'fallback'),
  'fallback-link': new Element('a', 'fallback-link')
};
elements['fallback'].className = __FALLBACK_CLASS__;

var document = {
  getElementById: function (id) { return elements[id] || null; },
  createElement: function (tag) { return new Element(tag, null); }
};

var location = { hash: __HASH__, search: __SEARCH__ };
Object.defineProperty(location, 'href', {
  get: function () { return navigated; },
  set: function (value) { navigated = value; }
});
var window = { location: location };

function setTimeout(fn, ms) {
  timers.push({ fn: fn, ms: ms });
}

function URLSearchParams(init) {
  this.pairs = [];
  var input = init.charAt(0) === '?' ? init.substring(1) : init;
  var parts = input.split('&');
  for (var i = 0; i < parts.length; i++) {
    if (parts[i] === '') {
      continue;
    }
    var eq = parts[i].indexOf('=');
    var key = eq < 0 ? parts[i] : parts[i].substring(0, eq);
    var value = eq < 0 ? '' : parts[i].substring(eq + 1);
    this.pairs.push([
      decodeURIComponent(key.replace(/\+/g, ' ')),
      decodeURIComponent(value.replace(/\+/g, ' '))
    ]);
  }
}
URLSearchParams.prototype.get = function (key) {
  for (var i = 0; i < this.pairs.length; i++) {
    if (this.pairs[i][0] === key) {
      return this.pairs[i][1];
    }
  }
  return null;
};
"#;

const REPORT: &str = r#"
(function () {
  function tree(el) {
    return {
      tag: el.tagName,
      className: el.className,
      href: el.href,
      text: el.textContent,
      children: el.children.map(tree)
    };
  }
  var report = {
    navigated: navigated,
    fallback_href: elements['fallback-link'].href,
    fallback_class: elements['fallback'].className,
    timers: timers.map(function (t) { return t.ms; }),
    container: elements['container'].children.map(tree)
  };
  timers.forEach(function (t) { t.fn(); });
  report.fallback_class_after_timers = elements['fallback'].className;
  return JSON.stringify(report);
})()
"#;

fn script(html: &str) -> &str {
    let start = html.find("<script>").unwrap() + "<script>".len();
    let end = html.find("</script>").unwrap();
    &html[start..end]
}

/// Loads the page for `config` at a URL with the given `hash` and `search`
/// and reports what the script did.
fn run(config: &RedirectConfig, hash: &str, search: &str) -> Value {
    let page = Page::render(config).unwrap();
    let html = String::from_utf8(page.bytes().to_vec()).unwrap();

    let fallback_class = if html.contains(r#"<p id="fallback" class="hidden">"#) {
        "hidden"
    } else {
        ""
    };

    let dom = DOM
        .replace("__FALLBACK_CLASS__", &serde_json::to_string(fallback_class).unwrap())
        .replace("__HASH__", &serde_json::to_string(hash).unwrap())
        .replace("__SEARCH__", &serde_json::to_string(search).unwrap());

    let mut context = Context::default();
    context.eval(Source::from_bytes(&dom)).unwrap();
    context.eval(Source::from_bytes(script(&html))).unwrap();

    let report = context
        .eval(Source::from_bytes(REPORT))
        .unwrap()
        .to_string(&mut context)
        .unwrap()
        .to_std_string_escaped();

    serde_json::from_str(&report).unwrap()
}

/// Where the Rust model of the script says the page should go.
fn expected(config: &RedirectConfig, hash: &str, search: &str) -> Option<String> {
    ResetRequest::resolve(config.token_source, hash, search)
        .map(|req| config.link.target(&req).to_string())
}

fn navigated(report: &Value) -> Option<Url> {
    report["navigated"].as_str().map(|l| Url::parse(l).unwrap())
}

fn pair(key: &str, value: &str) -> (String, String) {
    (key.to_owned(), value.to_owned())
}

#[test]
fn hash_token_navigates() {
    let config = RedirectConfig::auth_callback_with_timer();
    let hash = "#access_token=A%26%3D&refresh_token=R";

    let report = run(&config, hash, "");

    assert_eq!(
        report["navigated"],
        "parkmywhip://parkmywhip.com/reset-password?access_token=A%26%3D&refresh_token=R&type=recovery"
    );
    assert_eq!(report["fallback_href"], report["navigated"]);
    assert_eq!(report["navigated"].as_str().map(str::to_owned), expected(&config, hash, ""));
}

#[test]
fn hash_wins_over_query() {
    let config = RedirectConfig::auth_callback();
    let hash = "#access_token=A&refresh_token=R&type=recovery";

    let report = run(&config, hash, "?token=T");

    assert_eq!(
        query_pairs(&navigated(&report).unwrap()),
        [pair("access_token", "A"), pair("refresh_token", "R"), pair("type", "recovery")]
    );
    assert_eq!(
        report["navigated"].as_str().map(str::to_owned),
        expected(&config, hash, "?token=T")
    );
}

#[test]
fn query_fallback() {
    let config = RedirectConfig::auth_callback();

    let report = run(&config, "", "?token=T");

    assert_eq!(
        report["navigated"],
        "parkmywhip://parkmywhip.com/reset-password?token=T&type=recovery"
    );
    assert_eq!(report["fallback_href"], report["navigated"]);
    assert_eq!(
        report["navigated"].as_str().map(str::to_owned),
        expected(&config, "", "?token=T")
    );
}

#[test]
fn missing_token_shows_error() {
    let config = RedirectConfig::auth_callback_with_timer();

    for (hash, search) in [("", ""), ("#refresh_token=R", "?type=recovery"), ("#access_token=", "?token=")] {
        let report = run(&config, hash, search);

        assert!(report["navigated"].is_null(), "{hash} {search}");
        assert_eq!(expected(&config, hash, search), None);
        assert_eq!(report["timers"], serde_json::json!([]));
        assert_eq!(report["fallback_href"], "");

        let container = report["container"].as_array().unwrap();
        assert_eq!(container.len(), 3);
        assert_eq!(container[0]["tag"], "h2");
        assert_eq!(container[0]["className"], "error");
        assert_eq!(
            container[1]["text"],
            "Missing reset token. Please request a new password reset link."
        );

        let home = &container[2]["children"][0];
        assert_eq!(home["tag"], "a");
        assert_eq!(home["href"], "parkmywhip://parkmywhip.com");
        assert_eq!(home["text"], "Open ParkMyWhip App");
    }
}

#[test]
fn reserved_characters_are_encoded() {
    let config = RedirectConfig::auth_callback();

    for token in ["a&b", "x=y", "hash#tag", "100%", "with space", "p+q", "ünï/cødé?"] {
        let hash = form_urlencoded::Serializer::new(String::from("#"))
            .append_pair("access_token", token)
            .append_pair("refresh_token", "r&=t")
            .finish();
        let search = form_urlencoded::Serializer::new(String::from("?"))
            .append_pair("token", token)
            .finish();

        let from_hash = navigated(&run(&config, &hash, "")).unwrap();
        assert_eq!(from_hash.fragment(), None, "{token}");
        assert_eq!(
            query_pairs(&from_hash),
            [pair("access_token", token), pair("refresh_token", "r&=t"), pair("type", "recovery")]
        );

        let from_query = navigated(&run(&config, "", &search)).unwrap();
        assert_eq!(
            query_pairs(&from_query),
            [pair("token", token), pair("type", "recovery")]
        );
    }
}

#[test]
fn sources_are_respected() {
    let query_only = RedirectConfig {
        token_source: TokenSource::Query,
        ..RedirectConfig::auth_callback()
    };
    assert!(run(&query_only, "#access_token=A", "")["navigated"].is_null());

    let hash_only = RedirectConfig {
        token_source: TokenSource::Hash,
        ..RedirectConfig::auth_callback()
    };
    assert!(run(&hash_only, "", "?token=T")["navigated"].is_null());
    assert!(run(&hash_only, "#access_token=A", "?token=T")["navigated"]
        .as_str()
        .unwrap()
        .contains("access_token=A"));
}

#[test]
fn timer_reveals_fallback() {
    let report = run(&RedirectConfig::auth_callback_with_timer(), "", "?token=T");

    assert_eq!(report["fallback_class"], "hidden");
    assert_eq!(report["timers"], serde_json::json!([3000]));
    assert_eq!(report["fallback_class_after_timers"], "");
}

#[test]
fn no_timer_without_delay() {
    let report = run(&RedirectConfig::auth_callback(), "", "?token=T");

    assert_eq!(report["fallback_class"], "");
    assert_eq!(report["timers"], serde_json::json!([]));
}
