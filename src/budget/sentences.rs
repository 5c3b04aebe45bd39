use std::iter::Peekable;
use std::str::CharIndices;

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Lazy iterator over sentence ends in a string.
///
/// Yields the byte offset just past each `.`, `!` or `?` that is followed by
/// whitespace or the end of the string. Offsets are strictly increasing and
/// always land on a char boundary.
pub struct Boundaries<'a> {
    chars: Peekable<CharIndices<'a>>,
}

impl Iterator for Boundaries<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while let Some((idx, c)) = self.chars.next() {
            if !is_terminator(c) {
                continue;
            }
            match self.chars.peek() {
                None => return Some(idx + c.len_utf8()),
                Some((_, next)) if next.is_whitespace() => return Some(idx + c.len_utf8()),
                Some(_) => {}
            }
        }
        None
    }
}

pub fn boundaries(text: &str) -> Boundaries<'_> {
    Boundaries {
        chars: text.char_indices().peekable(),
    }
}

/// Latest sentence end at or before `limit` (a byte offset).
pub fn last_boundary_at_or_before(text: &str, limit: usize) -> Option<usize> {
    boundaries(text).take_while(|&b| b <= limit).last()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all(text: &str) -> Vec<usize> {
        boundaries(text).collect()
    }

    #[test]
    fn test_basic_sentences() {
        assert_eq!(all("Hello. World."), vec![6, 13]);
        assert_eq!(all("Really? Yes! Fine."), vec![7, 12, 18]);
    }

    #[test]
    fn test_requires_whitespace_or_end() {
        assert_eq!(all("version 1.2.3 is out"), Vec::<usize>::new());
        assert_eq!(all("see example.com. Done"), vec![16]);
        assert_eq!(all("Wait...\nwhat"), vec![7]);
    }

    #[test]
    fn test_no_terminators() {
        assert!(all("no sentence end here").is_empty());
        assert!(all("").is_empty());
    }

    #[test]
    fn test_multibyte_offsets_are_char_boundaries() {
        let text = "Ünïcödé. Ça va? Oui!";
        let offsets = all(text);
        assert_eq!(offsets.len(), 3);
        for b in &offsets {
            assert!(text.is_char_boundary(*b));
            assert!(is_terminator(text[..*b].chars().last().unwrap()));
        }
        assert_eq!(*offsets.last().unwrap(), text.len());
    }

    #[test]
    fn test_strictly_increasing() {
        let text = "A. B! C? D. E.";
        let offsets = all(text);
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_last_boundary_at_or_before() {
        let text = "One. Two. Three.";
        assert_eq!(last_boundary_at_or_before(text, 3), None);
        assert_eq!(last_boundary_at_or_before(text, 4), Some(4));
        assert_eq!(last_boundary_at_or_before(text, 12), Some(9));
        assert_eq!(last_boundary_at_or_before(text, 100), Some(16));
    }
}
