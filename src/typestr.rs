// src/typestr.rs
//
// Operations on the compact encoded type strings used throughout the front
// end. A type is a sequence of constructor elements terminated by a base
// name:
//
//   "p.int"                 pointer to int              int *
//   "r.q(const).int"        reference to const int      int const &
//   "q(const).p.char"       const pointer to char       char *const
//   "a(10).p.char"          array of pointer to char    char *[10]
//   "f(int,double).int"     function returning int
//   "v.r.T"                 variadic pack of T &
//   "Box<(int,p.A)>"        template with arguments     Box< int,A * >
//
// Elements are separated by '.' at parenthesis depth zero; template argument
// lists are bracketed as "<(" ... ")>" so their contents never terminate an
// element. Everything here works on plain strings; in-place operations take
// `&mut String`.

use crate::ast::{Parm, ParmList};
use crate::util::replace_id;

/// Byte length of the leading element of `s`, including its trailing '.'.
/// If `s` holds a single (base) element the whole length is returned.
pub(crate) fn element_span(s: &str) -> usize {
    let mut depth = 0usize;
    for (i, b) in s.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'.' if depth == 0 => return i + 1,
            _ => {}
        }
    }
    s.len()
}

/// Split a type into its constructor elements plus base.
fn elements(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        let n = element_span(rest);
        out.push(&rest[..n]);
        rest = &rest[n..];
    }
    out
}

/// The terminal base of a type: "r.q(const).int" -> "int".
pub fn base(s: &str) -> &str {
    let mut pos = 0;
    loop {
        let n = element_span(&s[pos..]);
        if pos + n >= s.len() {
            return &s[pos..];
        }
        pos += n;
    }
}

/// Everything before the base: "r.q(const).int" -> "r.q(const).".
pub fn prefix(s: &str) -> &str {
    let b = base(s);
    &s[..s.len() - b.len()]
}

/// The last complete element of a prefix string, or None if it is empty.
/// "f().r.q(const).p." -> "p."
pub fn last(prefix: &str) -> Option<&str> {
    if prefix.is_empty() {
        return None;
    }
    let mut pos = 0;
    loop {
        let n = element_span(&prefix[pos..]);
        if pos + n >= prefix.len() {
            return Some(&prefix[pos..]);
        }
        pos += n;
    }
}

pub fn is_pointer(el: &str) -> bool {
    el.starts_with("p.")
}

pub fn is_reference(el: &str) -> bool {
    el.starts_with("r.")
}

pub fn is_qualifier(el: &str) -> bool {
    el.starts_with("q(")
}

pub fn is_array(el: &str) -> bool {
    el.starts_with("a(")
}

/// True if the outermost constructor of `s` is a function.
pub fn is_function(s: &str) -> bool {
    s.starts_with("f(")
}

/// True if `s` carries the variadic pack marker.
pub fn is_variadic(s: &str) -> bool {
    s == "v" || s.starts_with("v.")
}

/// True if `s` contains an encoded template argument list anywhere.
pub fn is_template(s: &str) -> bool {
    s.contains("<(")
}

/// Strip the leading variadic marker in place.
pub fn del_variadic(s: &mut String) {
    debug_assert!(is_variadic(s));
    if s.starts_with("v.") {
        s.replace_range(..2, "");
    } else if s == "v" {
        s.clear();
    }
}

/// Append an encoded template argument list built from `parms`. Each
/// argument contributes its value if present, otherwise its type.
pub fn add_template(name: &mut String, parms: &[Parm]) {
    name.push_str("<(");
    for (i, p) in parms.iter().enumerate() {
        if i > 0 {
            name.push(',');
        }
        if let Some(v) = p.value_or_type() {
            name.push_str(v);
        }
    }
    name.push_str(")>");
}

/// The name part before a template argument list: "Box<(int)>" -> "Box".
/// Names without an argument list are returned unchanged.
pub fn template_prefix(s: &str) -> &str {
    match s.find("<(") {
        Some(pos) => &s[..pos],
        None => s,
    }
}

/// Decompose "Name<(args)>tail" into (Name, args, tail).
fn template_inner(el: &str) -> Option<(&str, &str, &str)> {
    let open = el.find("<(")?;
    let mut depth = 0usize;
    for (i, b) in el[open + 1..].bytes().enumerate() {
        let pos = open + 1 + i;
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    if el[pos + 1..].starts_with('>') {
                        return Some((&el[..open], &el[open + 2..pos], &el[pos + 2..]));
                    }
                    return None;
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a comma-separated argument list at parenthesis depth zero.
fn split_commas(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    if s.is_empty() {
        return out;
    }
    let mut depth = 0usize;
    let mut start = 0;
    for (i, b) in s.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

/// The arguments of the outermost template argument list in the base of `s`.
pub fn template_args(s: &str) -> Option<Vec<String>> {
    let (_, inner, _) = template_inner(base(s))?;
    Some(split_commas(inner).into_iter().map(str::to_string).collect())
}

/// Decode the parameter list of a function type: "f(int,p.char)." yields
/// parameters typed "int" and "p.char".
pub fn function_parms(s: &str) -> Option<ParmList> {
    if !is_function(s) {
        return None;
    }
    let mut depth = 0usize;
    for (i, b) in s.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    let inner = &s[2..i];
                    return Some(split_commas(inner).into_iter().map(Parm::with_type).collect());
                }
            }
            _ => {}
        }
    }
    None
}

fn replace_name(s: &str, name: &str, rep: &str) -> String {
    if s == name {
        rep.to_string()
    } else if let Some(rest) = s.strip_prefix(name).filter(|r| r.starts_with("::")) {
        // Dependent names: "T::value_type" follows its rewritten qualifier.
        format!("{}{}", rep, rest)
    } else {
        s.to_string()
    }
}

fn typename_replace_element(out: &mut String, el: &str, name: &str, rep: &str) {
    if el.starts_with("f(") {
        if let Some(close) = el.rfind(')') {
            out.push_str("f(");
            for (i, arg) in split_commas(&el[2..close]).into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let mut a = arg.to_string();
                typename_replace(&mut a, name, rep);
                out.push_str(&a);
            }
            out.push_str(&el[close..]);
            return;
        }
    } else if let Some((tprefix, inner, tail)) = template_inner(el) {
        if tprefix == name && is_template(rep) && template_prefix(rep) == tprefix {
            // Rewriting a self-reference to its instantiated form replaces
            // the whole element; repeating the rewrite is then a no-op.
            out.push_str(rep);
            out.push_str(tail);
            return;
        }
        out.push_str(&replace_name(tprefix, name, rep));
        out.push_str("<(");
        for (i, arg) in split_commas(inner).into_iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let mut a = arg.to_string();
            typename_replace(&mut a, name, rep);
            out.push_str(&a);
        }
        out.push_str(")>");
        out.push_str(tail);
        return;
    } else if !is_qualifier(el) && !is_array(el) && !el.ends_with('.') {
        out.push_str(&replace_name(el, name, rep));
        return;
    }
    out.push_str(el);
}

/// Replace the typename `name` with `rep` wherever it occurs as a base name,
/// a template argument, a function parameter type, or the qualifier of a
/// dependent name. Qualifier and array elements are left untouched.
pub fn typename_replace(t: &mut String, name: &str, rep: &str) {
    if !t.contains(name) {
        return;
    }
    let mut out = String::with_capacity(t.len());
    let mut rest = t.as_str();
    while !rest.is_empty() {
        let n = element_span(rest);
        typename_replace_element(&mut out, &rest[..n], name, rep);
        rest = &rest[n..];
    }
    *t = out;
}

/// Expand any variadic pack fragments left inside function parameter lists
/// or template arguments: with pack parameter `T` expanded to `A,B`, the
/// fragment "f(v.p.T).void" becomes "f(p.A,p.B).void". Top-level types are
/// expected to have been expanded already by the parameter-list pass.
pub fn variadic_replace(t: &mut String, unexpanded: Option<&Parm>, expanded: &[Parm]) {
    let Some(pack) = unexpanded.and_then(|p| p.name.as_deref()) else {
        return;
    };
    if !t.contains("v.") {
        return;
    }
    let mut out = String::with_capacity(t.len());
    let mut rest = t.as_str();
    while !rest.is_empty() {
        let n = element_span(rest);
        let el = &rest[..n];
        rest = &rest[n..];
        if el.starts_with("f(") {
            if let Some(close) = el.rfind(')') {
                out.push_str("f(");
                let mut first = true;
                for arg in split_commas(&el[2..close]) {
                    if is_variadic(arg) {
                        let tail = &arg[2..];
                        for ep in expanded {
                            if !first {
                                out.push(',');
                            }
                            first = false;
                            let mut na = tail.to_string();
                            replace_id(&mut na, pack, ep.value_or_type().unwrap_or(""));
                            out.push_str(&na);
                        }
                    } else {
                        if !first {
                            out.push(',');
                        }
                        first = false;
                        let mut a = arg.to_string();
                        variadic_replace(&mut a, unexpanded, expanded);
                        out.push_str(&a);
                    }
                }
                out.push_str(&el[close..]);
                continue;
            }
        } else if let Some((tprefix, inner, tail)) = template_inner(el) {
            out.push_str(tprefix);
            out.push_str("<(");
            let mut first = true;
            for arg in split_commas(inner) {
                if is_variadic(arg) {
                    let arg_tail = &arg[2..];
                    for ep in expanded {
                        if !first {
                            out.push(',');
                        }
                        first = false;
                        let mut na = arg_tail.to_string();
                        replace_id(&mut na, pack, ep.value_or_type().unwrap_or(""));
                        out.push_str(&na);
                    }
                } else {
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    let mut a = arg.to_string();
                    variadic_replace(&mut a, unexpanded, expanded);
                    out.push_str(&a);
                }
            }
            out.push_str(")>");
            out.push_str(tail);
            continue;
        }
        out.push_str(el);
    }
    *t = out;
}

fn base_display(b: &str) -> String {
    match template_inner(b) {
        Some((tprefix, inner, tail)) => {
            let args: Vec<String> = split_commas(inner).into_iter().map(cpp_str).collect();
            format!("{}< {} >{}", tprefix, args.join(","), tail)
        }
        None => b.to_string(),
    }
}

/// Render an encoded type as C++ source text: "r.q(const).int" becomes
/// "int const &". Used for the display form of substituted code fragments.
pub fn cpp_str(ty: &str) -> String {
    let els = elements(ty);
    let Some((b, prefix_els)) = els.split_last() else {
        return String::new();
    };
    let mut out = base_display(b);
    for el in prefix_els.iter().rev() {
        if is_qualifier(el) {
            let q = &el[2..el.len() - 2];
            if out.ends_with('*') || out.ends_with('&') {
                out.push_str(q);
            } else {
                out.push(' ');
                out.push_str(q);
            }
        } else if is_pointer(el) {
            if out.ends_with('*') {
                out.push('*');
            } else {
                out.push_str(" *");
            }
        } else if is_reference(el) {
            if out.ends_with('*') {
                out.push('&');
            } else {
                out.push_str(" &");
            }
        } else if is_array(el) {
            out.push('[');
            out.push_str(&el[2..el.len() - 2]);
            out.push(']');
        } else if el.starts_with("f(") {
            if let Some(close) = el.rfind(')') {
                let args: Vec<String> = split_commas(&el[2..close]).into_iter().map(cpp_str).collect();
                out.push('(');
                out.push_str(&args.join(","));
                out.push(')');
            }
        } else if is_variadic(el) {
            out.push_str("...");
        }
    }
    out
}

/// Render a (possibly templated) name for diagnostics: "Box<(p.int)>"
/// becomes "Box< int * >".
pub fn namestr(s: &str) -> String {
    match template_inner(s) {
        Some((tprefix, inner, tail)) => {
            let args: Vec<String> = split_commas(inner).into_iter().map(|a| namestr_arg(a)).collect();
            format!("{}< {} >{}", tprefix, args.join(","), tail)
        }
        None => s.to_string(),
    }
}

fn namestr_arg(a: &str) -> String {
    if is_template(a) && prefix(a).is_empty() {
        namestr(a)
    } else {
        cpp_str(a)
    }
}
