use super::markup::Element;

/// Inline editorial annotations and the markers they render with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    Correction,
    Deletion,
    Expansion,
    Illegible,
    Supplied,
}

impl Annotation {
    pub const ALL: [Annotation; 5] = [
        Annotation::Correction,
        Annotation::Deletion,
        Annotation::Expansion,
        Annotation::Illegible,
        Annotation::Supplied,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Annotation::Correction => "corr",
            Annotation::Deletion => "del",
            Annotation::Expansion => "exp",
            Annotation::Illegible => "ill",
            Annotation::Supplied => "sup",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Annotation> {
        Annotation::ALL.into_iter().find(|a| a.tag() == tag)
    }

    fn markers(self) -> (&'static str, &'static str) {
        match self {
            Annotation::Correction | Annotation::Supplied => ("[", "]"),
            Annotation::Deletion => ("<-", "->"),
            Annotation::Expansion => ("{", "}"),
            Annotation::Illegible => ("", ""),
        }
    }
}

pub const ILLEGIBLE: &str = "[illegible]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Wrap content in the annotation's markers.
    #[default]
    Annotate,
    /// Drop the tag, keep the content.
    Plain,
    /// Drop the tag and its content.
    Omit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnnotationPolicy {
    pub correction: Mode,
    pub deletion: Mode,
    pub expansion: Mode,
    pub illegible: Mode,
    pub supplied: Mode,
}

impl AnnotationPolicy {
    pub const fn uniform(mode: Mode) -> Self {
        AnnotationPolicy {
            correction: mode,
            deletion: mode,
            expansion: mode,
            illegible: mode,
            supplied: mode,
        }
    }

    pub const fn annotated() -> Self {
        Self::uniform(Mode::Annotate)
    }

    pub const fn plain() -> Self {
        Self::uniform(Mode::Plain)
    }

    /// Headings: deleted words left out, everything else marked.
    pub fn title() -> Self {
        Self::annotated().with(Annotation::Deletion, Mode::Omit)
    }

    pub fn with(mut self, kind: Annotation, mode: Mode) -> Self {
        *self.slot(kind) = mode;
        self
    }

    pub fn mode(&self, kind: Annotation) -> Mode {
        match kind {
            Annotation::Correction => self.correction,
            Annotation::Deletion => self.deletion,
            Annotation::Expansion => self.expansion,
            Annotation::Illegible => self.illegible,
            Annotation::Supplied => self.supplied,
        }
    }

    fn slot(&mut self, kind: Annotation) -> &mut Mode {
        match kind {
            Annotation::Correction => &mut self.correction,
            Annotation::Deletion => &mut self.deletion,
            Annotation::Expansion => &mut self.expansion,
            Annotation::Illegible => &mut self.illegible,
            Annotation::Supplied => &mut self.supplied,
        }
    }
}

/// Flatten `el` to text. The element's own tail is not included; every
/// descendant's tail is, exactly once, in document position.
pub fn render(el: &Element, policy: &AnnotationPolicy) -> String {
    let mut out = String::new();
    write_node(el, policy, &mut out);
    out
}

fn write_node(el: &Element, policy: &AnnotationPolicy, out: &mut String) {
    let annotation = Annotation::from_tag(&el.tag).map(|kind| (kind, policy.mode(kind)));
    match annotation {
        Some((_, Mode::Omit)) => {}
        Some((Annotation::Illegible, Mode::Annotate)) => out.push_str(ILLEGIBLE),
        Some((kind, Mode::Annotate)) => {
            let (open, close) = kind.markers();
            out.push_str(open);
            write_content(el, policy, out);
            out.push_str(close);
        }
        _ => write_content(el, policy, out),
    }
}

fn write_content(el: &Element, policy: &AnnotationPolicy, out: &mut String) {
    out.push_str(&el.text);
    for child in &el.children {
        write_node(child, policy, out);
        out.push_str(&child.tail);
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::markup::parse;
    use proptest::prelude::*;

    fn render_str(xml: &str, policy: &AnnotationPolicy) -> String {
        render(&parse(xml).unwrap(), policy)
    }

    const ALL_KINDS: &str = "<entry><div><ab>\
        <add>foo bar</add><corr>foo bar</corr><del>foo bar</del><emph>foo bar</emph>\
        <exp>foo bar</exp><gap/><ill/><superscript>foo bar</superscript>\
        <sup>foo bar</sup><underline>foo bar</underline>\
        </ab></div></entry>";

    #[test]
    fn every_kind_annotated() {
        assert_eq!(
            render_str(ALL_KINDS, &AnnotationPolicy::annotated()),
            "foo bar[foo bar]<-foo bar->foo bar{foo bar}[illegible]foo bar[foo bar]foo bar"
        );
    }

    #[test]
    fn every_kind_plain() {
        assert_eq!(
            render_str(ALL_KINDS, &AnnotationPolicy::plain()),
            "foo barfoo barfoo barfoo barfoo barfoo barfoo barfoo bar"
        );
    }

    #[test]
    fn tail_follows_closing_marker() {
        assert_eq!(render_str("<del>X</del>Y", &AnnotationPolicy::annotated()), "<-X->Y");
    }

    #[test]
    fn nested_content_stays_inside_markers() {
        let xml = "<ab>figs<del>, <ill/><cn><m>gold</m> coins</cn>,</del> and jazz</ab>";
        assert_eq!(
            render_str(xml, &AnnotationPolicy::annotated()),
            "figs<-, [illegible]gold coins,-> and jazz"
        );
    }

    #[test]
    fn omit_keeps_tail() {
        let xml = "<head>My title <del>with deleted text</del> ends</head>";
        assert_eq!(render_str(xml, &AnnotationPolicy::title()), "My title  ends");
        let only_del = AnnotationPolicy::plain().with(Annotation::Deletion, Mode::Omit);
        assert_eq!(render_str("<ab>a<del>b<m>c</m></del>d</ab>", &only_del), "ad");
    }

    #[test]
    fn illegible_drops_content() {
        let xml = "<ab>a <ill>xyz</ill> b</ab>";
        assert_eq!(render_str(xml, &AnnotationPolicy::annotated()), "a [illegible] b");
        assert_eq!(render_str(xml, &AnnotationPolicy::plain()), "a xyz b");
    }

    #[test]
    fn same_tree_many_policies() {
        let tree = parse("<ab>a<corr>b</corr><exp>c</exp>d</ab>").unwrap();
        let first = render(&tree, &AnnotationPolicy::annotated());
        let plain = render(&tree, &AnnotationPolicy::plain());
        let again = render(&tree, &AnnotationPolicy::annotated());
        assert_eq!(first, "a[b]{c}d");
        assert_eq!(plain, "abcd");
        assert_eq!(first, again);
    }

    fn arb_tree() -> impl Strategy<Value = Element> {
        let leaf = ("[a-z ]{0,6}", "[a-z ]{0,6}").prop_map(|(text, tail)| Element {
            tag: "m".to_string(),
            text,
            tail,
            ..Default::default()
        });
        leaf.prop_recursive(3, 32, 4, |inner| {
            (
                prop::sample::select(vec!["corr", "del", "exp", "sup", "ab", "m", "pa"]),
                "[a-z ]{0,6}",
                "[a-z ]{0,6}",
                prop::collection::vec(inner, 0..4),
            )
                .prop_map(|(tag, text, tail, children)| Element {
                    tag: tag.to_string(),
                    text,
                    tail,
                    children,
                    ..Default::default()
                })
        })
    }

    fn strip_markers(s: &str) -> String {
        ["<-", "->", "[", "]", "{", "}"]
            .iter()
            .fold(s.to_string(), |acc, m| acc.replace(m, ""))
    }

    proptest! {
        #[test]
        fn annotated_minus_markers_is_plain(tree in arb_tree()) {
            let annotated = render(&tree, &AnnotationPolicy::annotated());
            let plain = render(&tree, &AnnotationPolicy::plain());
            prop_assert_eq!(strip_markers(&annotated), plain);
        }
    }
}
