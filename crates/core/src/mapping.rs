//! Filename-prefix resolution of column mapping profiles.
//!
//! Rules are evaluated in order and the first prefix that starts the file
//! name wins, so the order of [`MappingTable::default`] is part of its
//! contract.

/// Column roles for one class of source files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingProfile {
    pub id_column: &'static str,
    pub title_column: &'static str,
    pub body_column: &'static str,
    pub keyword_columns: Vec<&'static str>,
}

impl MappingProfile {
    pub fn new(
        id_column: &'static str,
        title_column: &'static str,
        body_column: &'static str,
        keyword_columns: &[&'static str],
    ) -> Self {
        Self {
            id_column,
            title_column,
            body_column,
            keyword_columns: keyword_columns.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    pub prefix: &'static str,
    pub profile: MappingProfile,
}

impl MappingRule {
    pub fn matches(&self, filename: &str) -> bool {
        filename.starts_with(self.prefix)
    }
}

#[derive(Debug, Clone)]
pub struct MappingTable {
    rules: Vec<MappingRule>,
}

impl MappingTable {
    pub fn new(rules: Vec<MappingRule>) -> Self {
        Self { rules }
    }

    pub fn resolve(&self, filename: &str) -> Option<&MappingProfile> {
        self.rules
            .iter()
            .find(|rule| rule.matches(filename))
            .map(|rule| &rule.profile)
    }
}

impl Default for MappingTable {
    fn default() -> Self {
        let rule = |prefix, profile| MappingRule { prefix, profile };
        let boletim = || MappingProfile::new("KEY", "TITULO", "ENUNCIADO", &["ENUNCIADO"]);
        let tema = || MappingProfile::new("KEY", "TEMA", "ENUNCIADO", &["TEMA", "SUBTEMA", "INDEXACAO"]);

        Self::new(vec![
            rule(
                "acordao-completo-",
                MappingProfile::new("KEY", "TITULO", "SUMARIO", &["ASSUNTO", "TIPOPROCESSO"]),
            ),
            rule("boletim-jurisprudencia.csv", boletim()),
            rule("boletim-pessoal.csv", boletim()),
            rule("boletim-informativo-lc.csv", boletim()),
            rule(
                "inabilitados-funcao-publica.csv",
                MappingProfile::new("CPF", "NOME", "PROCESSO", &["NOME", "PROCESSO", "DELIBERACAO"]),
            ),
            rule("jurisprudencia-selecionada", tema()),
            rule(
                "licitantes-inidoneos.csv",
                MappingProfile::new(
                    "CPF_CNPJ",
                    "NOME",
                    "PROCESSO",
                    &["NOME", "PROCESSO", "DELIBERACAO"],
                ),
            ),
            rule(
                "norma_",
                MappingProfile::new("KEY", "TITULO", "TEXTONORMA", &["TEMA", "ASSUNTO"]),
            ),
            rule(
                "resp-contas-julgadas-irreg-implicacao-eleitoral.csv",
                MappingProfile::new("CPF", "NOME", "PROCESSO", &["NOME", "PROCESSO", "CARGO/FUNCAO"]),
            ),
            rule(
                "resp-contas-julgadas-irregulares.csv",
                MappingProfile::new("CPF_CNPJ", "NOME", "PROCESSO", &["NOME", "PROCESSO"]),
            ),
            rule("resposta-consulta.csv", tema()),
            rule("sumula.csv", tema()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_rules_match_split_parts() {
        let table = MappingTable::default();
        let profile = table.resolve("acordao-completo-2021_parte_3.csv").unwrap();
        assert_eq!(profile.body_column, "SUMARIO");

        let profile = table.resolve("norma_federal.csv").unwrap();
        assert_eq!(profile.body_column, "TEXTONORMA");
        assert_eq!(profile.keyword_columns, vec!["TEMA", "ASSUNTO"]);
    }

    #[test]
    fn exact_name_rules_match_whole_name() {
        let table = MappingTable::default();
        let profile = table.resolve("licitantes-inidoneos.csv").unwrap();
        assert_eq!(profile.id_column, "CPF_CNPJ");
        assert!(table.resolve("sumula_parte_1.csv").is_none());
    }

    #[test]
    fn unknown_files_resolve_to_none() {
        assert!(MappingTable::default().resolve("relatorio.csv").is_none());
    }

    #[test]
    fn first_matching_rule_wins() {
        let table = MappingTable::new(vec![
            MappingRule {
                prefix: "resp-contas",
                profile: MappingProfile::new("A", "B", "C", &[]),
            },
            MappingRule {
                prefix: "resp-contas-julgadas",
                profile: MappingProfile::new("X", "Y", "Z", &[]),
            },
        ]);

        let profile = table.resolve("resp-contas-julgadas-irregulares.csv").unwrap();
        assert_eq!(profile.id_column, "A");
    }

    #[test]
    fn eleitoral_rule_precedes_generic_irregulares() {
        let table = MappingTable::default();
        let profile = table
            .resolve("resp-contas-julgadas-irreg-implicacao-eleitoral.csv")
            .unwrap();
        assert_eq!(profile.id_column, "CPF");
        assert!(profile.keyword_columns.contains(&"CARGO/FUNCAO"));
    }
}
