use scraper::{ElementRef, Html};
use sitegrab_lib::clean::EMPTY_INPUT_PLACEHOLDER;
use sitegrab_lib::{clean_markup, AllowListPolicy, Cleaner, CleanerOptions, CleaningPolicy};

const LANDING_PAGE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Acme</title>
  <link rel="stylesheet" href="/app.css">
  <style>body { margin: 0 }</style>
  <script src="/analytics.js"></script>
</head>
<body class="home" data-page="landing">
  <!-- header -->
  <header class="top" style="height:60px">
    <nav aria-label="Main" data-testid="nav">
      <a href="/" class="logo" onclick="go()"><svg viewBox="0 0 10 10"><path d="M0 0h10v10z"></path></svg>Acme</a>
      <ul><li><a href="/pricing" target="_blank" rel="noopener">Pricing</a></li><li><a href="#" role="button">Menu</a></li></ul>
    </nav>
  </header>
  <main id="content">
    <section>
      <h1 data-anim="fade">Build faster</h1>
      <p>Ship <b>today</b> with <i>less</i> code.&nbsp;Really.</p>
      <picture>
        <source media="(min-width: 800px)" srcset="/hero-large.avif 1x, /hero-large@2x.avif 2x">
        <source type="image/webp" srcset="/hero.webp 1x">
        <img src="/hero.jpg" alt="Dashboard" width="1200" height="600" loading="lazy" class="hero">
      </picture>
      <picture><source srcset="/orphan.webp"></picture>
    </section>
    <form action="/signup" method="post" class="signup" data-track="form">
      <label for="email">Email</label>
      <input type="email" id="email" name="email" placeholder="you@example.com" required>
      <input type="checkbox" checked>
      <select name="plan"><option value="free" selected>Free</option><option value="pro">Pro</option></select>
      <textarea name="note" rows="3"></textarea>
      <button type="submit" disabled class="btn">Sign up</button>
    </form>
    <noscript><img src="/pixel.gif"></noscript>
    <template><p>hidden</p></template>
    <canvas width="10" height="10"></canvas>
  </main>
  <footer><p>&copy; 2024 Acme &amp; friends</p></footer>
  <script>window.dataLayer = [];</script>
</body>
</html>"##;

const FRAGMENTS: &[&str] = &[
    r#"<div><p>one<p>two</div><ul><li>a<li>b</ul>"#,
    r#"<table class="grid"><tr><th scope="col">Name</th></tr><tr><td data-x="1">Ann</td></tr></table>"#,
    r#"<p>a <b>b</b> c</p><br><hr><img src="x.png" alt="">"#,
    r#"<!-- only a comment --><span style="color:red">  spaced   out  </span>"#,
    r#"<a href="" role="">empty</a><input value="" type="">"#,
    r#"<div><picture><img src="plain.png" alt="p"></picture></div>"#,
];

fn samples() -> Vec<&'static str> {
    let mut all = vec![LANDING_PAGE];
    all.extend_from_slice(FRAGMENTS);
    all
}

fn cleaner(policy: CleaningPolicy) -> Cleaner {
    Cleaner::new(CleanerOptions::with_policy(policy))
}

/// Every element of `markup` except the parser-inserted root.
fn elements(markup: &str) -> Vec<(String, Vec<(String, String)>)> {
    let fragment = Html::parse_fragment(markup);
    fragment
        .root_element()
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .map(|el| {
            let attrs = el
                .value()
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();
            (el.value().name().to_string(), attrs)
        })
        .collect()
}

#[test]
fn cleaning_is_idempotent_under_both_policies() {
    for policy in [CleaningPolicy::Structure, CleaningPolicy::Fidelity] {
        let cleaner = cleaner(policy);
        for sample in samples() {
            let once = cleaner.clean(Some(sample));
            let twice = cleaner.clean(Some(&once));
            assert_eq!(once, twice, "not idempotent under {policy} for {sample}");
        }
    }
}

#[test]
fn structure_output_only_carries_allowed_attributes() {
    let allow = AllowListPolicy::structure();
    for sample in samples() {
        let cleaned = clean_markup(Some(sample));
        for (tag, attrs) in elements(&cleaned) {
            for (name, _) in attrs {
                assert!(
                    allow.permits(&tag, &name),
                    "<{tag}> kept disallowed attribute {name} in {cleaned}"
                );
                assert!(!name.starts_with("data-"), "{cleaned}");
            }
        }
    }
}

#[test]
fn fidelity_output_only_carries_allowed_attributes() {
    let allow = AllowListPolicy::fidelity();
    let cleaned = cleaner(CleaningPolicy::Fidelity).clean(Some(LANDING_PAGE));
    for (tag, attrs) in elements(&cleaned) {
        for (name, _) in attrs {
            assert!(allow.permits(&tag, &name), "<{tag}> kept {name}");
        }
    }
    assert!(cleaned.contains(r#"class="top""#), "{cleaned}");
}

#[test]
fn forbidden_subtrees_never_survive() {
    for policy in [CleaningPolicy::Structure, CleaningPolicy::Fidelity] {
        let cleaned = cleaner(policy).clean(Some(LANDING_PAGE));
        let names: Vec<String> = elements(&cleaned).into_iter().map(|(tag, _)| tag).collect();
        for removed in policy.removed_tags() {
            assert!(
                !names.iter().any(|name| name.as_str() == *removed),
                "<{removed}> survived under {policy}: {cleaned}"
            );
        }
        assert!(!cleaned.contains("dataLayer"));
        assert!(!cleaned.contains("hidden"));
        assert!(!cleaned.contains("pixel.gif"));
    }
}

#[test]
fn comments_are_eliminated() {
    for sample in samples() {
        let cleaned = clean_markup(Some(sample));
        assert!(!cleaned.contains("<!--"), "{cleaned}");
    }
}

#[test]
fn every_picture_becomes_at_most_one_img() {
    for policy in [CleaningPolicy::Structure, CleaningPolicy::Fidelity] {
        let cleaned = cleaner(policy).clean(Some(LANDING_PAGE));
        let names: Vec<String> = elements(&cleaned).into_iter().map(|(tag, _)| tag).collect();
        assert!(!names.iter().any(|n| n == "picture" || n == "source"), "{cleaned}");
        assert!(cleaned.contains(r#"src="/hero.webp""#), "{cleaned}");
        assert!(cleaned.contains(r#"alt="Dashboard""#), "{cleaned}");
        assert!(!cleaned.contains("orphan"), "{cleaned}");
        assert!(!cleaned.contains("loading="), "{cleaned}");
    }

    let cleaned = clean_markup(Some(FRAGMENTS[5]));
    assert_eq!(cleaned, "<div>\n <img src=\"plain.png\" alt=\"p\">\n</div>");
}

#[test]
fn document_keeps_body_content_and_drops_head() {
    let cleaned = clean_markup(Some(LANDING_PAGE));
    assert!(cleaned.starts_with("<body>"), "{cleaned}");
    assert!(!cleaned.contains("<title>"), "{cleaned}");
    assert!(cleaned.contains("<h1>Build faster</h1>"), "{cleaned}");
    assert!(cleaned.contains(r#"<form action="/signup" method="post">"#), "{cleaned}");
    assert!(cleaned.contains(r#"<label for="email">Email</label>"#), "{cleaned}");
    assert!(cleaned.contains("&amp; friends"), "{cleaned}");
    assert!(!cleaned.contains("onclick"), "{cleaned}");
}

#[test]
fn fidelity_document_carries_head_stylesheets_into_body() {
    let raw = r#"<!DOCTYPE html><html><head><link rel="stylesheet" href="/app.css"><style>body{margin:0}</style></head><body><p class="a">x</p></body></html>"#;

    let cleaned = cleaner(CleaningPolicy::Fidelity).clean(Some(raw));
    let found = elements(&cleaned);
    let names: Vec<&str> = found.iter().map(|(tag, _)| tag.as_str()).collect();
    assert_eq!(names, ["link", "style", "p"], "{cleaned}");
    let link_attrs = &found[0].1;
    assert!(link_attrs.contains(&("href".to_string(), "/app.css".to_string())));
    assert!(cleaned.contains("<style>body{margin:0}</style>"), "{cleaned}");
    assert!(cleaned.contains(r#"<p class="a">x</p>"#), "{cleaned}");
    assert_eq!(cleaner(CleaningPolicy::Fidelity).clean(Some(&cleaned)), cleaned);

    let landing = cleaner(CleaningPolicy::Fidelity).clean(Some(LANDING_PAGE));
    assert!(landing.contains(r#"href="/app.css""#), "{landing}");
    assert!(landing.contains("<style>body { margin: 0 }</style>"), "{landing}");
    assert!(!landing.contains("<title>"), "{landing}");
}

#[test]
fn header_led_fragment_is_not_wrapped_in_body() {
    let cleaned = clean_markup(Some("<header><nav>x</nav></header><main>y</main>"));
    assert_eq!(cleaned, "<header>\n <nav>x</nav>\n</header>\n<main>y</main>");
}

#[test]
fn null_and_empty_inputs_yield_the_placeholder() {
    for policy in [CleaningPolicy::Structure, CleaningPolicy::Fidelity] {
        let cleaner = cleaner(policy);
        assert_eq!(cleaner.clean(None), EMPTY_INPUT_PLACEHOLDER);
        assert_eq!(cleaner.clean(Some("")), EMPTY_INPUT_PLACEHOLDER);
        assert_eq!(cleaner.clean(Some("\n  \r\n")), EMPTY_INPUT_PLACEHOLDER);
    }
}

#[test]
fn pathological_nesting_is_contained() {
    let deep = "<div>".repeat(5_000);
    let cleaned = clean_markup(Some(&deep));
    assert!(
        cleaned.starts_with("<!-- HTML cleaning process failed:"),
        "{cleaned}"
    );
    assert!(cleaned.ends_with("-->"));
}

#[test]
fn whitespace_only_between_tags_is_discarded() {
    let cleaned = clean_markup(Some("<div>\n\n   <span>x</span>\n\t</div>"));
    assert_eq!(cleaned, "<div>\n <span>x</span>\n</div>");
}
