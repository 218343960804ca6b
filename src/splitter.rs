//! Mechanisms for splitting the content of pseudo-files into tokens
//!
//! The metadata provided by procfs pseudo-files often has a two-dimensional
//! inner structure. Lines of text represent different devices or categories of
//! information, whereas space-separated columns are used to separate the
//! details of a single line (e.g. idle CPU time vs user-mode CPU time).
//!
//! Rust provides ways of dealing with this hierarchy (namely SplitWhitespace
//! and Lines), but a naive line- and space- splitter based on them does many
//! things which we do not need:
//!
//! - It iterates through each line twice, once to determine its boundaries and
//!   another time to separate its columns. This work can be carried out in a
//!   single pass through the text, at the cost of a bit more code complexity.
//! - It treats "characters" in a Unicode-aware fashion, accounting for things
//!   like exotic whitespace characters, whereas the Linux kernel only separates
//!   its output with newlines, spaces and tabs.
//!
//! We thus provide a single-pass splitter for lines and whitespace-separated
//! columns. Other pseudo-files, like /proc/meminfo or /proc/<pid>/status, are
//! made of "Key: value" lines instead, and /proc/cpuinfo additionally groups
//! such lines into blank-separated blocks. Splitters are provided for these
//! layouts as well.
//!
//! All splitters hand out slices of their input: no token is ever copied.


/// Mechanism for splitting the elements of newline- and space-separated text
///
/// To use this pseudo-file splitter, proceed as follows:
///
/// - Initialize it on an input string with new()
/// - To iterate over lines, call next(). If there is a line of text left in the
///   input, this will produce an iterator over the space-separated columns of
///   that line, otherwise this function will return None.
///
/// This interface was designed to mimick regular Rust iterators, except for the
/// fact that the "parent" line iterator and its "children" column iterators
/// actually share a common character iterator under the hood.
///
/// Working in this fashion avoids internally parsing each line of input twice,
/// once for extracting the line and another time for separating its columns.
/// However, it also introduces additional restrictions with respect to
/// standard Rust iterators. For example, a column iterator cannot be live at
/// the time where SplitLinesBySpace::next() is called, as it would be
/// invalidated. Hence SplitLinesBySpace cannot implement std::iter::Iterator.
///
/// Runs of spaces and tabs are treated as a single separator. A trailing
/// newline at the end of the input does not start an extra, empty line.
///
#[derive(Debug, PartialEq)]
pub struct SplitLinesBySpace<'a> {
    /// Reference to the string which we are trying to split
    target: &'a str,

    /// Iterator over the characters, with on-demand access to byte indices
    char_iter: FastCharIndices<'a>,

    /// Small state machine tracking our input location (beginning or middle
    /// of a line, end of the input string...)
    status: LineSpaceSplitterStatus,

    /// Number of lines which were handed out so far
    line_count: usize,
}
//
impl<'a> SplitLinesBySpace<'a> {
    /// Create a line- and space-splitting iterator
    pub fn new(target: &'a str) -> Self {
        let char_iter = FastCharIndices::new(target);
        let input_empty = char_iter.is_empty();
        Self {
            target,
            char_iter,
            status: if input_empty {
                        LineSpaceSplitterStatus::AtInputEnd
                    } else {
                        LineSpaceSplitterStatus::AtLineStart
                    },
            line_count: 0,
        }
    }

    /// Iterate over lines (see caveats in struct description)
    pub fn next<'b>(&'b mut self) -> Option<SplitColumns<'a, 'b>>
        where 'a: 'b
    {
        match self.status {
            // We are at the beginning of a line of text. Tell the client that
            // it can parse it, and be ready to skip it on the next call.
            LineSpaceSplitterStatus::AtLineStart => {
                self.status = LineSpaceSplitterStatus::InsideLine;
                self.line_count += 1;
                Some(SplitColumns{ parent: self })
            },

            // We are in the middle of a line of text. Skip it by iterating
            // until we reach either the end of that line, or that of the input.
            LineSpaceSplitterStatus::InsideLine => loop {
                match self.char_iter.next() {
                    // A newline was encountered. Check if there is text after
                    // it or it's just trailing at the end of the input.
                    Some('\n') => {
                        if self.char_iter.is_empty() {
                            self.status = LineSpaceSplitterStatus::AtInputEnd;
                            return None;
                        } else {
                            self.line_count += 1;
                            return Some(SplitColumns{ parent: self });
                        }
                    }

                    // Some other character was encountered. Continue iteration.
                    Some(_) => continue,

                    // We reached the end of the input, and will stop there.
                    None => {
                        self.status = LineSpaceSplitterStatus::AtInputEnd;
                        return None;
                    },
                }
            },

            // There is no next line, we are at the end of the input string
            LineSpaceSplitterStatus::AtInputEnd => None,
        }
    }

    /// 1-based number of the line which was last handed out by next(), for
    /// error reporting purposes (0 if next() was never called successfully)
    pub fn line_number(&self) -> usize {
        self.line_count
    }

    // INTERNAL: Iterate over the space-separated columns of the current line.
    //           This is essentially the implementation of SplitColumns::next().
    fn next_col(&mut self) -> Option<&'a str> {
        // Once the end of the line has been signaled, keep signaling it
        if self.status != LineSpaceSplitterStatus::InsideLine {
            return None;
        }

        // Consume input chars until we reach something that's not a space
        let first_non_space = loop {
            match self.char_iter.next() {
                Some(' ') | Some('\t') => continue,
                other => break other,
            }
        };

        // Determine if we reached a new column of data, or the end of the line
        let first_idx = match first_non_space {
            // We reached the end of the line. Prepare the line iterator for the
            // next line, and notify the column iterator client that we're done
            // with this line by returning a None.
            Some('\n') => {
                self.status = if self.char_iter.is_empty() {
                                  LineSpaceSplitterStatus::AtInputEnd
                              } else {
                                  LineSpaceSplitterStatus::AtLineStart
                              };
                return None;
            },

            // We reached the beginning of a data column. Yield its index and
            // let the remainder of this function extract and return the data.
            Some(_) => self.char_iter.prev_index(),

            // We reached the end of the input text. Terminate all iteration.
            None => {
                self.status = LineSpaceSplitterStatus::AtInputEnd;
                return None;
            },
        };

        // If control reaches this point, we're inside of a data column. Iterate
        // through input chars until we reach a column terminator (whitespace
        // character or end of the input text), to locate the end of the column.
        let last_idx = loop {
            match self.char_iter.next() {
                // Spaces and tabs can be discarded. The end of the input is
                // one past the last character.
                Some(' ') | Some('\t') => break self.char_iter.prev_index(),
                None => break self.target.len(),

                // We must backtrack on end-of-line terminators, as they can
                // only be handled by the next column iterator invocation.
                Some('\n') => {
                    let last_idx = self.char_iter.prev_index();
                    self.char_iter.back();
                    break last_idx;
                },

                // We are still fetching data characters from the column.
                Some(_) => continue,
            }
        };

        // Both indices sit on ASCII separators or on the ends of the input, so
        // they are valid char boundaries even if the column holds UTF-8 text.
        Some(&self.target[first_idx..last_idx])
    }
}
///
/// State machine used by SplitLinesBySpace when iterating over lines
#[derive(Debug, PartialEq)]
enum LineSpaceSplitterStatus { AtLineStart, InsideLine, AtInputEnd }
///
///
/// For each line of the input text, SplitLinesBySpace produces an iterator over
/// the space-separated columns of that line. This inner iterator advances the
/// internal character iterator of the "outer" SplitLinesBySpace, so as long as
/// it is alive, SplitLinesBySpace cannot be iterated over further.
///
/// The column iterator can be consumed ("moved away"), which unlocks the full
/// power of the standard Rust iteration interface.
///
#[derive(Debug, PartialEq)]
pub struct SplitColumns<'a, 'b> where 'a: 'b {
    /// Underlying SplitLinesBySpace iterator
    parent: &'b mut SplitLinesBySpace<'a>,
}
//
impl<'a, 'b> SplitColumns<'a, 'b> {
    /// 1-based number of the line whose columns are being iterated over
    pub fn line_number(&self) -> usize {
        self.parent.line_number()
    }
}
//
impl<'a, 'b> Iterator for SplitColumns<'a, 'b> {
    /// We're outputting strings
    type Item = &'a str;

    /// This is how one iterates through space-separated columns until a newline
    fn next(&mut self) -> Option<Self::Item> {
        self.parent.next_col()
    }
}
///
///
/// A conceptual cousin of PutBack<CharIndices>, but more tightly optimized for
/// the needs of SplitLinesBySpace:
///
/// - We only care about ASCII separators, so we can work byte by byte. Bytes
///   of multi-byte UTF-8 sequences are all >= 0x80 and never match them.
/// - We need characters all the time, but indices only infrequently
/// - We may rarely backtrack on one specific character ('\n')
///
/// This iterator is fused: it will continue to output None indefinitely after
/// the end.
///
#[derive(Debug, PartialEq)]
struct FastCharIndices<'a> {
    /// Byte-wise view of the original string
    raw_bytes: &'a [u8],

    /// Byte index of the _next_ character
    next_char_index: usize,
}
//
impl<'a> FastCharIndices<'a> {
    /// Initialize the iterator
    #[inline]
    fn new(input: &'a str) -> Self {
        Self {
            raw_bytes: input.as_bytes(),
            next_char_index: 0,
        }
    }

    /// Non-destructively tell whether we reached the end of the iterator
    #[inline]
    fn is_empty(&self) -> bool {
        self.next_char_index >= self.raw_bytes.len()
    }

    /// Tell what was the index of the last character from next()
    #[inline]
    fn prev_index(&self) -> usize {
        self.next_char_index - 1
    }

    /// Go back to the previous character, reverting the action of next()
    #[inline]
    fn back(&mut self) {
        self.next_char_index -= 1;
    }
}
///
impl<'a> Iterator for FastCharIndices<'a> {
    /// We implement the iterator interface for character iteration
    type Item = char;

    /// This is how we iterate through bytes, seen as characters
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let result = self.raw_bytes.get(self.next_char_index)
                                   .map(|b| char::from(*b));
        if result.is_some() {
            self.next_char_index += 1;
        }
        result
    }
}
//
impl<'a> std::iter::FusedIterator for FastCharIndices<'a> {}


/// One line of a "Key: value" pseudo-file, as produced by SplitKeyValue
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyValue<'a> {
    /// A well-formed line. Both sides of the colon are trimmed from spaces
    /// and tabs, and the value may be empty (e.g. "Tracer:" with no tracer).
    Pair { line: usize, key: &'a str, value: &'a str },

    /// An empty line, or a line made only of whitespace
    Blank { line: usize },

    /// A non-blank line which does not have a colon in it
    Malformed { line: usize, text: &'a str },
}
//
impl<'a> KeyValue<'a> {
    /// 1-based line number, for error reporting purposes
    pub fn line(&self) -> usize {
        match *self {
            KeyValue::Pair { line, .. }
            | KeyValue::Blank { line }
            | KeyValue::Malformed { line, .. } => line,
        }
    }
}


/// Splitter for text made of "Key: value" lines
///
/// Only the first colon separates the key from the value, so values may
/// contain colons themselves. Lines are numbered from 1 by default.
///
#[derive(Clone, Debug)]
pub struct SplitKeyValue<'a> {
    /// Lines that remain to be split
    lines: std::str::Split<'a, char>,

    /// Number of the next line
    next_line: usize,

    /// Truth that the input ends with a newline, in which case the final
    /// empty fragment produced by split() is not a line
    trailing_newline: bool,

    /// Amount of fragments left before the end of the input
    remaining: usize,
}
//
impl<'a> SplitKeyValue<'a> {
    /// Start splitting some text
    pub fn new(target: &'a str) -> Self {
        let trailing_newline = target.ends_with('\n');
        let fragments = if target.is_empty() {
                            0
                        } else {
                            target.bytes().filter(|&b| b == b'\n').count() + 1
                        };
        Self {
            lines: target.split('\n'),
            next_line: 1,
            trailing_newline,
            remaining: if trailing_newline { fragments - 1 } else { fragments },
        }
    }

    /// Number lines starting from `first_line` instead of 1, for use on text
    /// which was extracted from the middle of a larger file
    pub fn with_first_line(self, first_line: usize) -> Self {
        Self { next_line: first_line, ..self }
    }
}
//
impl<'a> Iterator for SplitKeyValue<'a> {
    type Item = KeyValue<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let text = self.lines.next()?;
        let line = self.next_line;
        self.next_line += 1;

        if is_blank(text) {
            return Some(KeyValue::Blank { line });
        }
        Some(match text.split_once(':') {
            Some((key, value)) => KeyValue::Pair {
                line,
                key: trim_spaces(key),
                value: trim_spaces(value),
            },
            None => KeyValue::Malformed { line, text },
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
//
impl<'a> ExactSizeIterator for SplitKeyValue<'a> {}


/// Splitter for files made of repeated blocks of "Key: value" lines
///
/// A block starts at a line whose key is the label (e.g. "processor" in
/// /proc/cpuinfo) and extends until the next blank line, the next labelled
/// line, or the end of the input, whichever comes first. Lines which are
/// outside of any block, such as the machine-wide trailer that some ARM
/// kernels print at the end of /proc/cpuinfo, are skipped.
///
#[derive(Clone, Debug)]
pub struct RepeatedBlocks<'a> {
    /// Text which we are trying to split
    target: &'a str,

    /// Key which marks the start of a block
    label: &'a str,

    /// Byte index of the first line that was not consumed yet
    position: usize,

    /// Number of that line
    line_number: usize,
}
//
impl<'a> RepeatedBlocks<'a> {
    /// Start splitting some text into blocks
    pub fn new(target: &'a str, label: &'a str) -> Self {
        Self {
            target,
            label,
            position: 0,
            line_number: 1,
        }
    }

    // INTERNAL: Look at the next line, without its trailing newline
    fn peek_line(&self) -> Option<&'a str> {
        let rest = self.target.get(self.position..)?;
        if rest.is_empty() {
            return None;
        }
        Some(rest.split('\n').next().unwrap_or(rest))
    }

    // INTERNAL: Move past a line previously returned by peek_line()
    fn consume_line(&mut self, line: &str) {
        self.position = (self.position + line.len() + 1).min(self.target.len());
        self.line_number += 1;
    }

    // INTERNAL: Truth that a line starts a new block
    fn is_label(&self, line: &str) -> bool {
        line.split_once(':')
            .map_or(false, |(key, _)| trim_spaces(key) == self.label)
    }
}
//
impl<'a> Iterator for RepeatedBlocks<'a> {
    type Item = Block<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        // Skip everything until the next labelled line
        loop {
            let line = self.peek_line()?;
            if self.is_label(line) {
                break;
            }
            self.consume_line(line);
        }

        // Accumulate lines until the end of the block
        let start = self.position;
        let first_line = self.line_number;
        let mut end = start;
        while let Some(line) = self.peek_line() {
            if (self.position != start) &&
               (is_blank(line) || self.is_label(line)) {
                break;
            }
            end = self.position + line.len();
            self.consume_line(line);
        }

        Some(Block {
            text: &self.target[start..end],
            first_line,
        })
    }
}


/// A block of "Key: value" lines from RepeatedBlocks
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Block<'a> {
    /// Text of the block, without its terminating newline
    text: &'a str,

    /// Number of the first line of the block in the original input
    first_line: usize,
}
//
impl<'a> Block<'a> {
    /// Split the block into "Key: value" pairs, numbered like the original
    /// input lines
    pub fn key_values(&self) -> SplitKeyValue<'a> {
        SplitKeyValue::new(self.text).with_first_line(self.first_line)
    }

    /// Raw lines of the block
    pub fn lines(&self) -> std::str::Lines<'a> {
        self.text.lines()
    }

    /// Number of the first line of the block in the original input
    pub fn first_line(&self) -> usize {
        self.first_line
    }
}


/// INTERNAL: Truth that a line contains nothing but whitespace
fn is_blank(line: &str) -> bool {
    trim_spaces(line).is_empty()
}

/// INTERNAL: Trim the separators used by the kernel around a token
fn trim_spaces(text: &str) -> &str {
    text.trim_matches(|c| c == ' ' || c == '\t' || c == '\r')
}


/// Testing code often needs to split a single line of text, even though The
/// Real Thing operates on more complex input. This test harness handles this.
#[cfg(test)]
pub(crate) fn split_line_and_run<'a, F, R>(input: &'a str, test_runner: F) -> R
    where F: for<'b> FnOnce(SplitColumns<'a, 'b>) -> R
{
    let mut lines = SplitLinesBySpace::new(input);
    let result = test_runner(lines.next().expect("Input should not be empty"));
    assert!(lines.next().is_none(), "Input should be only one line long");
    result
}
