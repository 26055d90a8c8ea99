//! Redis-style glob matching over raw bytes.
//!
//! Supports `*`, `?`, `[abc]`, `[^abc]` / `[!abc]`, ranges like `[a-z]`, and
//! `\` to escape the next character. Matching is iterative with
//! backtracking to the most recent `*`, so it is O(n*m) in the worst case.

/// A pattern compiled once and matched against many keys or members.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pat: Vec<u8>,
    match_all: bool,
}

impl GlobPattern {
    /// An empty pattern matches everything, like `*`.
    pub fn new(pattern: &str) -> Self {
        let pat = pattern.as_bytes().to_vec();
        let match_all = pat.is_empty() || pat.iter().all(|&c| c == b'*');
        Self { pat, match_all }
    }

    pub fn matches(&self, text: &[u8]) -> bool {
        self.match_all || glob_match(&self.pat, text)
    }

    pub fn is_match_all(&self) -> bool {
        self.match_all
    }
}

pub fn glob_match(pat: &[u8], text: &[u8]) -> bool {
    let mut pi = 0;
    let mut ti = 0;

    // backtracking state for the most recent '*'
    let mut star_pi: Option<usize> = None;
    let mut star_ti = 0;

    while ti < text.len() {
        if pi < pat.len() {
            match pat[pi] {
                b'*' => {
                    star_pi = Some(pi);
                    star_ti = ti;
                    pi += 1;
                    continue;
                }
                b'?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                b'[' => {
                    if let Some((matched, next)) = match_class(pat, pi, text[ti]) {
                        if matched {
                            pi = next;
                            ti += 1;
                            continue;
                        }
                    }
                }
                b'\\' if pi + 1 < pat.len() => {
                    if pat[pi + 1] == text[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c => {
                    if c == text[ti] {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
            }
        }

        // mismatch: retry from the last star, consuming one more text byte
        match star_pi {
            Some(sp) => {
                pi = sp + 1;
                star_ti += 1;
                ti = star_ti;
            }
            None => return false,
        }
    }

    // only trailing stars may remain
    while pi < pat.len() && pat[pi] == b'*' {
        pi += 1;
    }
    pi == pat.len()
}

/// Matches `c` against the class starting at `pat[start] == '['`.
/// Returns whether it matched and the index just past the closing `]`, or
/// `None` for an unterminated class.
fn match_class(pat: &[u8], start: usize, c: u8) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negated = i < pat.len() && (pat[i] == b'^' || pat[i] == b'!');
    if negated {
        i += 1;
    }

    let mut matched = false;
    while i < pat.len() && pat[i] != b']' {
        if pat[i] == b'\\' && i + 1 < pat.len() {
            if pat[i + 1] == c {
                matched = true;
            }
            i += 2;
        } else if i + 2 < pat.len() && pat[i + 1] == b'-' && pat[i + 2] != b']' {
            let (lo, hi) = if pat[i] <= pat[i + 2] {
                (pat[i], pat[i + 2])
            } else {
                (pat[i + 2], pat[i])
            };
            if lo <= c && c <= hi {
                matched = true;
            }
            i += 3;
        } else {
            if pat[i] == c {
                matched = true;
            }
            i += 1;
        }
    }

    if i >= pat.len() {
        return None;
    }
    Some((matched != negated, i + 1))
}
