//! Markdown compiler using pulldown-cmark.

use std::collections::HashMap;

use prestatic_core::config::{CompilerConfig, OutputFormat};
use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, html};
use tracing::trace;

use crate::{
    ArtifactData, CompileContext, CompileError, CompiledArtifact, ContentCompiler, Result,
    TocEntry, syntax::SyntaxHighlighter,
};

/// Markdown compiler with heading anchors and optional syntax highlighting.
#[derive(Debug)]
pub struct MarkdownCompiler {
    highlighter: Option<SyntaxHighlighter>,
    options: Options,
    format: OutputFormat,
    base_url: Option<String>,
    allow_html: bool,
}

impl Default for MarkdownCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownCompiler {
    /// Create a compiler producing highlighted HTML.
    pub fn new() -> Self {
        Self::from_config(&CompilerConfig::default())
    }

    /// Create a compiler from the `[compiler]` configuration section.
    pub fn from_config(config: &CompilerConfig) -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        let highlighter = (config.highlight && config.format == OutputFormat::Html)
            .then(|| SyntaxHighlighter::new(&config.syntax_theme));

        Self {
            highlighter,
            options,
            format: config.format,
            base_url: config.base_url.clone().filter(|b| !b.is_empty()),
            allow_html: config.allow_html,
        }
    }

    fn parse<'a>(&self, content: &'a str) -> Result<Vec<Event<'a>>> {
        let events: Vec<Event<'a>> = Parser::new_ext(content, self.options).collect();

        if !self.allow_html {
            if let Some(raw) = events.iter().find_map(|event| match event {
                Event::Html(raw) | Event::InlineHtml(raw) => Some(raw),
                _ => None,
            }) {
                return Err(CompileError::RawHtml {
                    snippet: raw.trim().chars().take(80).collect(),
                });
            }
        }

        Ok(events)
    }

    /// Render markdown to HTML and collect its table of contents.
    pub fn render_html(&self, content: &str) -> Result<(String, Vec<TocEntry>)> {
        let mut events = self.parse(content)?;
        let toc = assign_heading_ids(&mut events);

        let mut rewritten = Vec::with_capacity(events.len());
        let mut code_block: Option<(Option<String>, String)> = None;

        for event in events {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let info = match kind {
                        CodeBlockKind::Fenced(info) if !info.is_empty() => Some(info.to_string()),
                        _ => None,
                    };
                    code_block = Some((info, String::new()));
                }

                Event::End(TagEnd::CodeBlock) => {
                    if let Some((info, code)) = code_block.take() {
                        let rendered = match &self.highlighter {
                            Some(highlighter) => highlighter.highlight(&code, info.as_deref()),
                            None => crate::syntax::plain_block(&code, info.as_deref()),
                        };
                        rewritten.push(Event::Html(CowStr::from(rendered)));
                    }
                }

                Event::Text(text) if code_block.is_some() => {
                    if let Some((_, code)) = code_block.as_mut() {
                        code.push_str(&text);
                    }
                }

                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => rewritten.push(Event::Start(Tag::Link {
                    link_type,
                    dest_url: self.resolve_url(dest_url),
                    title,
                    id,
                })),

                Event::Start(Tag::Image {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => rewritten.push(Event::Start(Tag::Image {
                    link_type,
                    dest_url: self.resolve_url(dest_url),
                    title,
                    id,
                })),

                other => rewritten.push(other),
            }
        }

        let mut out = String::with_capacity(content.len() * 3 / 2);
        html::push_html(&mut out, rewritten.into_iter());
        Ok((out, toc))
    }

    /// Render markdown to plain text, dropping all markup.
    pub fn render_text(&self, content: &str) -> Result<(String, Vec<TocEntry>)> {
        let mut events = self.parse(content)?;
        let toc = assign_heading_ids(&mut events);
        let mut text = String::with_capacity(content.len());

        for event in events {
            match event {
                Event::Text(t) | Event::Code(t) | Event::InlineMath(t) | Event::DisplayMath(t) => {
                    text.push_str(&t)
                }
                Event::SoftBreak => text.push(' '),
                Event::HardBreak => text.push('\n'),
                Event::End(
                    TagEnd::Paragraph
                    | TagEnd::Heading(_)
                    | TagEnd::Item
                    | TagEnd::CodeBlock
                    | TagEnd::BlockQuote(_)
                    | TagEnd::TableRow
                    | TagEnd::TableHead,
                ) => {
                    if !text.ends_with('\n') {
                        text.push('\n');
                    }
                }
                Event::End(TagEnd::TableCell) => text.push('\t'),
                _ => {}
            }
        }

        Ok((text.trim().to_string(), toc))
    }

    /// Join a relative link target onto the configured base URL.
    fn resolve_url<'a>(&self, dest: CowStr<'a>) -> CowStr<'a> {
        match &self.base_url {
            Some(base) if is_relative_url(&dest) => {
                let relative = dest.strip_prefix("./").unwrap_or(&dest);
                CowStr::from(format!("{}/{}", base.trim_end_matches('/'), relative))
            }
            _ => dest,
        }
    }
}

impl ContentCompiler for MarkdownCompiler {
    fn compile(&self, raw: &str, ctx: &CompileContext<'_>) -> Result<CompiledArtifact> {
        trace!(slug = ctx.slug, path = %ctx.path, format = %self.format, "compiling markdown");

        let (value, toc) = match self.format {
            OutputFormat::Html => self.render_html(raw)?,
            OutputFormat::Text => self.render_text(raw)?,
        };

        Ok(CompiledArtifact {
            value,
            data: ArtifactData {
                format: self.format,
                toc,
            },
        })
    }

    fn identity(&self) -> String {
        format!(
            "markdown/{}?format={}&base_url={}&highlight={}&allow_html={}",
            env!("CARGO_PKG_VERSION"),
            self.format,
            self.base_url.as_deref().unwrap_or(""),
            self.highlighter
                .as_ref()
                .map(SyntaxHighlighter::theme)
                .unwrap_or("off"),
            self.allow_html,
        )
    }
}

/// Give every heading an anchor id and return the table of contents.
///
/// Explicit `{#id}` attributes are kept; other headings get a slug of their text.
/// Duplicate ids receive a numeric suffix.
fn assign_heading_ids(events: &mut [Event<'_>]) -> Vec<TocEntry> {
    let mut toc = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut current: Option<(usize, String)> = None;

    for i in 0..events.len() {
        match &events[i] {
            Event::Start(Tag::Heading { .. }) => current = Some((i, String::new())),
            Event::Text(t) | Event::Code(t) => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(t);
                }
            }
            Event::End(TagEnd::Heading(level)) => {
                let level = *level as u8;
                let Some((start, text)) = current.take() else {
                    continue;
                };

                if let Event::Start(Tag::Heading { id, .. }) = &mut events[start] {
                    let base = id
                        .as_ref()
                        .map(|explicit| explicit.to_string())
                        .unwrap_or_else(|| slugify(&text));
                    let count = seen.entry(base.clone()).or_insert(0);
                    let unique = if *count == 0 {
                        base
                    } else {
                        format!("{base}-{count}")
                    };
                    *count += 1;

                    *id = Some(CowStr::from(unique.clone()));
                    toc.push(TocEntry {
                        level,
                        text,
                        id: unique,
                    });
                }
            }
            _ => {}
        }
    }

    toc
}

/// Whether a link target should be resolved against a base URL.
fn is_relative_url(dest: &str) -> bool {
    if dest.is_empty() || dest.starts_with(['/', '#', '?']) {
        return false;
    }

    // A scheme is `alpha *( alpha / digit / "+" / "-" / "." )` followed by `:`.
    match dest.find(':') {
        Some(colon) => {
            let scheme = &dest[..colon];
            let is_scheme = scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            !is_scheme
        }
        None => true,
    }
}

/// Convert text to a URL-safe slug.
fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c.is_whitespace() || c == '-' || c == '_' {
                Some('-')
            } else {
                None
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
