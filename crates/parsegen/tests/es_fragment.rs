//! A sizable fixture: the grammar of an ECMAScript-spec grammar notation,
//! with newline-sensitive lines and a dozen variable terminals.

mod support;

use parsegen::{compile, opt, sym, Grammar};
use support::Lexer;

#[test]
fn parses_a_spec_grammar_fragment() {
    support::init_tracing();
    let grammar = Grammar::define(|g| {
        for t in ["NL", "EQ", "T", "CHR", "NTCALL", "NT", "NTALT", "PRODID", "PROSE", "WPROSE"] {
            g.variable_terminal(t);
        }
        g.rule("grammar", [sym("nt_def_or_blank_line")])?;
        g.rule("grammar", [sym("grammar"), sym("nt_def_or_blank_line")])?;
        g.rule("arg", [sym("sigil"), sym("NT")])?;
        g.rule("args", [sym("arg")])?;
        g.rule("args", [sym("args"), sym(","), sym("arg")])?;
        g.rule("definite_sigil", [sym("~")])?;
        g.rule("definite_sigil", [sym("+")])?;
        g.rule("exclusion", [sym("terminal")])?;
        g.rule("exclusion", [sym("nonterminal")])?;
        g.rule("exclusion", [sym("CHR"), sym("through"), sym("CHR")])?;
        g.rule("exclusion_list", [sym("exclusion")])?;
        g.rule("exclusion_list", [sym("exclusion_list"), sym("or"), sym("exclusion")])?;
        g.rule("ifdef", [sym("["), sym("definite_sigil"), sym("NT"), sym("]")])?;
        g.rule("line_terminator", [sym("NT")])?;
        g.rule("line_terminator", [sym("NTALT")])?;
        g.rule("lookahead_assertion", [sym("=="), sym("terminal")])?;
        g.rule("lookahead_assertion", [sym("!="), sym("terminal")])?;
        g.rule("lookahead_assertion", [sym("<!"), sym("NT")])?;
        g.rule("lookahead_assertion", [
            sym("<!"), sym("{"), sym("lookahead_exclusions"), sym("}"),
        ])?;
        g.rule("lookahead_exclusion", [sym("lookahead_exclusion_element")])?;
        g.rule("lookahead_exclusion", [
            sym("lookahead_exclusion"), sym("lookahead_exclusion_element"),
        ])?;
        g.rule("lookahead_exclusion_element", [sym("terminal")])?;
        g.rule("lookahead_exclusion_element", [sym("no_line_terminator_here")])?;
        g.rule("lookahead_exclusions", [sym("lookahead_exclusion")])?;
        g.rule("lookahead_exclusions", [
            sym("lookahead_exclusions"), sym(","), sym("lookahead_exclusion"),
        ])?;
        g.rule("no_line_terminator_here", [
            sym("["), sym("no"), sym("line_terminator"), sym("here"), sym("]"),
        ])?;
        g.rule("nonterminal", [sym("NT")])?;
        g.rule("nonterminal", [sym("NTCALL"), sym("["), sym("args"), sym("]")])?;
        g.rule("nt_def", [sym("nt_lhs"), sym("EQ"), sym("NL"), sym("rhs_lines"), sym("NL")])?;
        g.rule("nt_def", [
            sym("nt_lhs"), sym("EQ"), sym("one"), sym("of"), sym("NL"), sym("t_list_lines"),
            sym("NL"),
        ])?;
        g.rule("nt_def_or_blank_line", [sym("NL")])?;
        g.rule("nt_def_or_blank_line", [sym("nt_def")])?;
        g.rule("nt_lhs", [sym("NT")])?;
        g.rule("nt_lhs", [sym("NTCALL"), sym("["), sym("params"), sym("]")])?;
        g.rule("param", [sym("NT")])?;
        g.rule("params", [sym("param")])?;
        g.rule("params", [sym("params"), sym(","), sym("param")])?;
        g.rule("rhs", [sym("symbols")])?;
        g.rule("rhs", [sym("["), sym("empty"), sym("]")])?;
        g.rule("rhs_line", [opt("ifdef"), sym("rhs"), opt("PRODID"), sym("NL")])?;
        g.rule("rhs_line", [sym("PROSE"), sym("NL")])?;
        g.rule("rhs_lines", [sym("rhs_line")])?;
        g.rule("rhs_lines", [sym("rhs_lines"), sym("rhs_line")])?;
        g.rule("sigil", [sym("definite_sigil")])?;
        g.rule("sigil", [sym("?")])?;
        g.rule("symbol", [sym("terminal")])?;
        g.rule("symbol", [sym("nonterminal")])?;
        g.rule("symbol", [sym("nonterminal"), sym("?")])?;
        g.rule("symbol", [sym("nonterminal"), sym("but"), sym("not"), sym("exclusion")])?;
        g.rule("symbol", [
            sym("nonterminal"), sym("but"), sym("not"), sym("one"), sym("of"),
            sym("exclusion_list"),
        ])?;
        g.rule("symbol", [sym("["), sym("lookahead"), sym("lookahead_assertion"), sym("]")])?;
        g.rule("symbol", [sym("no_line_terminator_here")])?;
        g.rule("symbol", [sym("WPROSE")])?;
        g.rule("symbols", [sym("symbol")])?;
        g.rule("symbols", [sym("symbols"), sym("symbol")])?;
        g.rule("t_list_line", [sym("terminal_seq"), sym("NL")])?;
        g.rule("t_list_lines", [sym("t_list_line")])?;
        g.rule("t_list_lines", [sym("t_list_lines"), sym("t_list_line")])?;
        g.rule("terminal", [sym("T")])?;
        g.rule("terminal", [sym("CHR")])?;
        g.rule("terminal_seq", [sym("terminal")])?;
        g.rule("terminal_seq", [sym("terminal_seq"), sym("terminal")])?;
        Ok(())
    })
    .unwrap();
    let table = compile(&grammar).unwrap();

    let lexer = Lexer::new(
        "[ ] { } , ~ + ? <! == != but empty here lookahead no not of one or through",
    )
    .newline_tokens()
    .variable("EQ", support::m_colons)
    .variable("T", support::m_backtick)
    .variable("NTCALL", support::m_caps_call)
    .variable("NT", support::m_caps);

    let source = "\
IdentifierReference[Yield, Await] :
  Identifier
  [~Yield] `yield`
  [~Await] `await`

";
    let tokens = lexer.tokenize(source);
    parsegen::parse(&table, "grammar", tokens).unwrap();
}
