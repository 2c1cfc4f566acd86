//! Terminal rendering of search results

use crate::query::{SearchMatch, SearchPage};
use std::collections::BTreeMap;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn stdout(color: bool) -> StandardStream {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Print one page of matches in `repo:path:line:content` form, followed by a
/// summary line.
pub fn print_page(page: &SearchPage, offset: usize, color: bool) -> io::Result<()> {
    let mut out = stdout(color);
    write_page(&mut out, page, offset)
}

pub fn write_page<W: WriteColor>(out: &mut W, page: &SearchPage, offset: usize) -> io::Result<()> {
    for m in &page.results {
        write_match(out, m)?;
    }

    if page.total_count == 0 {
        return Ok(());
    }

    let first = offset.min(page.total_count);
    let last = first + page.results.len();
    out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
    if page.results.is_empty() {
        write!(out, "-- no results past offset {} of {} matches", offset, page.total_count)?;
    } else {
        write!(out, "-- {}-{} of {} matches", first + 1, last, page.total_count)?;
    }
    if page.has_more {
        write!(out, " (more available)")?;
    }
    out.reset()?;
    writeln!(out)
}

fn write_match<W: WriteColor>(out: &mut W, m: &SearchMatch) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Blue)))?;
    write!(out, "{}", m.repo)?;
    out.reset()?;
    write!(out, ":")?;
    out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
    write!(out, "{}", m.path)?;
    out.reset()?;
    write!(out, ":")?;
    out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
    write!(out, "{}", m.line_number)?;
    out.reset()?;
    write!(out, ":")?;

    let line = m.line.as_str();
    let mut cursor = 0;
    for &[start, end] in &m.match_ranges {
        // Ranges index the raw bytes; lossy decoding can shift them
        if start < cursor || end > line.len() || !line.is_char_boundary(start) || !line.is_char_boundary(end) {
            continue;
        }
        write!(out, "{}", &line[cursor..start])?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        write!(out, "{}", &line[start..end])?;
        out.reset()?;
        cursor = end;
    }
    writeln!(out, "{}", &line[cursor..])
}

/// Print each matching file once (for -l)
pub fn print_files_only(matches: &[SearchMatch], color: bool) -> io::Result<()> {
    let mut out = stdout(color);
    let mut seen = std::collections::HashSet::new();

    for m in matches {
        if seen.insert((m.repo.as_str(), m.path.as_str())) {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
            writeln!(out, "{}:{}", m.repo, m.path)?;
            out.reset()?;
        }
    }

    Ok(())
}

/// Print matching line count per file (for -c)
pub fn print_match_counts(matches: &[SearchMatch], color: bool) -> io::Result<()> {
    let mut out = stdout(color);
    let mut counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();

    for m in matches {
        *counts.entry((m.repo.as_str(), m.path.as_str())).or_insert(0) += 1;
    }

    for ((repo, path), count) in counts {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
        write!(out, "{}:{}", repo, path)?;
        out.reset()?;
        write!(out, ":")?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        writeln!(out, "{}", count)?;
        out.reset()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::Buffer;

    fn sample(line: &str, ranges: Vec<[usize; 2]>) -> SearchMatch {
        SearchMatch {
            repo: "acme/api".into(),
            path: "main.go".into(),
            language: Some("go".into()),
            line: line.into(),
            line_number: 2,
            match_ranges: ranges,
        }
    }

    #[test]
    fn test_write_page_plain() {
        let page = SearchPage {
            results: vec![sample("func main() {", vec![[0, 9]])],
            total_count: 3,
            has_more: true,
        };
        let mut buf = Buffer::no_color();
        write_page(&mut buf, &page, 0).unwrap();
        let text = String::from_utf8(buf.into_inner()).unwrap();
        assert_eq!(
            text,
            "acme/api:main.go:2:func main() {\n-- 1-1 of 3 matches (more available)\n"
        );
    }

    #[test]
    fn test_write_match_with_misaligned_range() {
        let mut buf = Buffer::no_color();
        write_match(&mut buf, &sample("héllo", vec![[2, 4]])).unwrap();
        let text = String::from_utf8(buf.into_inner()).unwrap();
        assert_eq!(text, "acme/api:main.go:2:héllo\n");
    }

    #[test]
    fn test_empty_page_prints_nothing() {
        let mut buf = Buffer::no_color();
        write_page(&mut buf, &SearchPage::default(), 0).unwrap();
        assert!(buf.into_inner().is_empty());
    }
}
