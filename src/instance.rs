//! Problem instances for the constrained longest common subsequence search.
//!
//! An instance bundles the input strings, the pattern strings (which must
//! appear in any solution as subsequences) and the anti-pattern strings
//! (which must not), together with the preprocessed lookup tables that make
//! every per-node feasibility query constant time.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// A character encoded as a dense integer in `0..sigma`.
pub type Letter = usize;

#[derive(Debug)]
pub enum InstanceError {
    Io(std::io::Error),
    MalformedHeader {
        line: String,
    },
    MalformedLine {
        line_no: usize,
        line: String,
    },
    LengthMismatch {
        line_no: usize,
        declared: usize,
        actual: usize,
    },
    MissingStrings {
        expected: usize,
        found: usize,
    },
    AlphabetOverflow {
        declared: usize,
        found: usize,
    },
    EmptyAntiPattern {
        index: usize,
    },
}

impl fmt::Display for InstanceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InstanceError::Io(e) => write!(f, "cannot read instance file: {e}"),
            InstanceError::MalformedHeader { line } => {
                write!(f, "malformed header line {line:?}, expected \"m sigma p r\"")
            }
            InstanceError::MalformedLine { line_no, line } => {
                write!(f, "malformed line {line_no}: {line:?}, expected \"length string\"")
            }
            InstanceError::LengthMismatch {
                line_no,
                declared,
                actual,
            } => write!(
                f,
                "line {line_no} declares length {declared} but the string has {actual} characters"
            ),
            InstanceError::MissingStrings { expected, found } => {
                write!(f, "expected {expected} strings but the file contains {found}")
            }
            InstanceError::AlphabetOverflow { declared, found } => write!(
                f,
                "header declares an alphabet of {declared} but {found} distinct characters appear"
            ),
            InstanceError::EmptyAntiPattern { index } => write!(
                f,
                "anti-pattern {index} is empty and would be embedded in every solution"
            ),
        }
    }
}

impl std::error::Error for InstanceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InstanceError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// An immutable problem instance. Read-only once constructed.
pub struct Instance {
    pub name: String,
    /// Number of input strings.
    pub m: usize,
    /// Alphabet size as declared by the instance header.
    pub sigma: usize,
    /// Number of pattern strings.
    pub p: usize,
    /// Number of anti-pattern strings.
    pub r: usize,
    pub s: Vec<Vec<Letter>>,
    pub patterns: Vec<Vec<Letter>>,
    pub anti_patterns: Vec<Vec<Letter>>,
    /// Letter code -> original character, in order of first appearance.
    pub alphabet: Vec<char>,
    // occurrences[a][i][j] = number of occurrences of a in s[i][j..]
    occurrences: Vec<Vec<Vec<usize>>>,
    // next_occ[a][i][j] = least k >= j with s[i][k] = a, or |s[i]| if none
    next_occ: Vec<Vec<Vec<usize>>>,
    // embed[i][j][x] = Some(k) for the greatest k such that patterns[j][x..]
    // embeds into s[i][k..] with its first letter matched at k
    embed: Vec<Vec<Vec<Option<usize>>>>,
}

impl Instance {
    /// Reads and parses an instance file. The instance name is the file's
    /// base name truncated at its first `.`.
    pub fn from_path(path: &Path) -> Result<Self, InstanceError> {
        let text = fs::read_to_string(path).map_err(InstanceError::Io)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .split('.')
            .next()
            .unwrap_or("")
            .to_string();
        Self::parse(&name, &text)
    }

    /// Parses the textual instance format: a header `m sigma p r`, followed
    /// by `m` input strings, `p` patterns and `r` anti-patterns, one per
    /// line as `length string`.
    pub fn parse(name: &str, text: &str) -> Result<Self, InstanceError> {
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());

        let (_, header) = lines.next().ok_or(InstanceError::MalformedHeader {
            line: String::new(),
        })?;
        let header_fields: Vec<usize> = header
            .split_whitespace()
            .map(|t| t.parse::<usize>())
            .collect::<Result<_, _>>()
            .map_err(|_| InstanceError::MalformedHeader {
                line: header.to_string(),
            })?;
        let &[m, sigma, p, r] = header_fields.as_slice() else {
            return Err(InstanceError::MalformedHeader {
                line: header.to_string(),
            });
        };

        let expected = m + p + r;
        let mut raw: Vec<Vec<char>> = Vec::with_capacity(expected);
        for _ in 0..expected {
            let Some((line_no, line)) = lines.next() else {
                return Err(InstanceError::MissingStrings {
                    expected,
                    found: raw.len(),
                });
            };
            let mut tokens = line.split_whitespace();
            let declared = tokens
                .next()
                .and_then(|t| t.parse::<usize>().ok())
                .ok_or_else(|| InstanceError::MalformedLine {
                    line_no: line_no + 1,
                    line: line.to_string(),
                })?;
            let chars: Vec<char> = tokens.next().unwrap_or("").chars().collect();
            if tokens.next().is_some() {
                return Err(InstanceError::MalformedLine {
                    line_no: line_no + 1,
                    line: line.to_string(),
                });
            }
            if declared != chars.len() {
                return Err(InstanceError::LengthMismatch {
                    line_no: line_no + 1,
                    declared,
                    actual: chars.len(),
                });
            }
            raw.push(chars);
        }

        // Dense letter codes in order of first appearance across the file.
        let mut codes: HashMap<char, Letter> = HashMap::new();
        let mut alphabet: Vec<char> = Vec::new();
        let encoded: Vec<Vec<Letter>> = raw
            .iter()
            .map(|chars| {
                chars
                    .iter()
                    .map(|&c| {
                        *codes.entry(c).or_insert_with(|| {
                            alphabet.push(c);
                            alphabet.len() - 1
                        })
                    })
                    .collect()
            })
            .collect();
        if alphabet.len() > sigma {
            return Err(InstanceError::AlphabetOverflow {
                declared: sigma,
                found: alphabet.len(),
            });
        }

        let mut encoded = encoded.into_iter();
        let s: Vec<Vec<Letter>> = encoded.by_ref().take(m).collect();
        let patterns: Vec<Vec<Letter>> = encoded.by_ref().take(p).collect();
        let anti_patterns: Vec<Vec<Letter>> = encoded.collect();
        if let Some(index) = anti_patterns.iter().position(|a| a.is_empty()) {
            return Err(InstanceError::EmptyAntiPattern { index });
        }

        let occurrences = build_occurrences(&s, sigma);
        let next_occ = build_next_occ(&s, sigma);
        let embed = build_embeddings(&s, &patterns);

        Ok(Instance {
            name: name.to_string(),
            m,
            sigma,
            p,
            r,
            s,
            patterns,
            anti_patterns,
            alphabet,
            occurrences,
            next_occ,
            embed,
        })
    }

    /// Number of occurrences of `letter` in `s[i][j..]`.
    #[inline]
    pub fn occurrences_from(&self, letter: Letter, i: usize, j: usize) -> usize {
        self.occurrences[letter][i][j]
    }

    /// Least position `k >= j` holding `letter` in `s[i]`, or `|s[i]|`.
    #[inline]
    pub fn next_occurrence(&self, letter: Letter, i: usize, j: usize) -> usize {
        self.next_occ[letter][i][j]
    }

    /// Greatest start position from which `patterns[j][x..]` still embeds
    /// into `s[i]`, if any.
    #[inline]
    pub fn embed_start(&self, i: usize, j: usize, x: usize) -> Option<usize> {
        self.embed[i][j][x]
    }

    /// Independent check of a finished solution against all three
    /// constraint families.
    pub fn is_feasible(&self, solution: &[Letter]) -> bool {
        self.s.iter().all(|si| is_subsequence(solution, si))
            && self.patterns.iter().all(|pj| is_subsequence(pj, solution))
            && !self
                .anti_patterns
                .iter()
                .any(|rk| is_subsequence(rk, solution))
    }

    /// Maps encoded letters back to their original characters.
    pub fn decode(&self, solution: &[Letter]) -> Vec<char> {
        solution.iter().map(|&l| self.alphabet[l]).collect()
    }
}

fn is_subsequence(needle: &[Letter], haystack: &[Letter]) -> bool {
    let mut matched = 0;
    for &h in haystack {
        if matched == needle.len() {
            break;
        }
        if needle[matched] == h {
            matched += 1;
        }
    }
    matched == needle.len()
}

fn build_occurrences(s: &[Vec<Letter>], sigma: usize) -> Vec<Vec<Vec<usize>>> {
    (0..sigma)
        .map(|a| {
            s.iter()
                .map(|si| {
                    let mut counts = vec![0; si.len()];
                    let mut count = 0;
                    for j in (0..si.len()).rev() {
                        if si[j] == a {
                            count += 1;
                        }
                        counts[j] = count;
                    }
                    counts
                })
                .collect()
        })
        .collect()
}

fn build_next_occ(s: &[Vec<Letter>], sigma: usize) -> Vec<Vec<Vec<usize>>> {
    (0..sigma)
        .map(|a| {
            s.iter()
                .map(|si| {
                    let mut next = vec![si.len(); si.len()];
                    let mut next_pos = si.len();
                    for j in (0..si.len()).rev() {
                        if si[j] == a {
                            next_pos = j;
                        }
                        next[j] = next_pos;
                    }
                    next
                })
                .collect()
        })
        .collect()
}

fn build_embeddings(s: &[Vec<Letter>], patterns: &[Vec<Letter>]) -> Vec<Vec<Vec<Option<usize>>>> {
    s.iter()
        .map(|si| {
            patterns
                .iter()
                .map(|pj| {
                    let mut starts = vec![None; pj.len()];
                    let mut x = pj.len();
                    for k in (0..si.len()).rev() {
                        if x == 0 {
                            break;
                        }
                        if si[k] == pj[x - 1] {
                            starts[x - 1] = Some(k);
                            x -= 1;
                        }
                    }
                    starts
                })
                .collect()
        })
        .collect()
}
