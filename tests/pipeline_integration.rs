//! End-to-end tests: walk, parse, enrich, graph and render real fixture trees.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use archscope::enrich::{InferenceRequest, InferenceResponse, TypeInferenceService};
use archscope::{
    ArchError, ClassEntity, Config, DiagnosticKind, Pipeline, RelationshipExtractor, TypeRef,
};
use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// `a.py: class Foo(Base)` with an untyped `x`, `b.py: class Base`.
fn foo_base_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "a.py",
        "class Foo(Base):\n    def __init__(self):\n        self.x = None\n",
    );
    write(dir.path(), "b.py", "class Base:\n    pass\n");
    dir
}

struct FixedAnswers(HashMap<String, String>);

#[async_trait]
impl TypeInferenceService for FixedAnswers {
    async fn infer(&self, batch: &[InferenceRequest]) -> archscope::Result<Vec<InferenceResponse>> {
        Ok(batch
            .iter()
            .filter_map(|r| {
                self.0.get(&r.slot).map(|ty| InferenceResponse {
                    slot: r.slot.clone(),
                    type_name: Some(ty.clone()),
                    confidence: 0.9,
                })
            })
            .collect())
    }
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn test_inheritance_scenario() {
        let dir = foo_base_project();
        let report = Pipeline::new(Config::default())
            .unwrap()
            .run(dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        let foo = report.graph.get("a.Foo").unwrap();
        let base = report.graph.get("b.Base").unwrap();
        assert_eq!(foo.inherits.iter().collect::<Vec<_>>(), vec!["b.Base"]);
        assert_eq!(base.inherited_by.iter().collect::<Vec<_>>(), vec!["a.Foo"]);
        assert!(foo.uses.is_empty());
        assert_eq!(foo.connections, 1);
        assert_eq!(base.connections, 1);
        assert!(report.analysis.class("a.Foo").unwrap().field("x").unwrap().type_ref.is_unknown());
    }

    #[tokio::test]
    async fn test_enrichment_scenario() {
        let dir = foo_base_project();
        let answers = FixedAnswers(HashMap::from([("a.Foo.x".to_string(), "Base".to_string())]));
        let report = Pipeline::new(Config::default())
            .unwrap()
            .with_inference_service(Arc::new(answers))
            .run(dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        let entity = report.analysis.class("a.Foo").unwrap();
        assert_eq!(entity.field("x").unwrap().type_ref, TypeRef::named("Base"));

        let foo = report.graph.get("a.Foo").unwrap();
        assert!(foo.uses.contains("b.Base"));
        assert!(foo.inherits.contains("b.Base"));
        assert_eq!(foo.connections, 1);
        assert_eq!(report.graph.get("b.Base").unwrap().connections, 1);

        let enrichment = report.enrichment.unwrap();
        assert_eq!(enrichment.requested, 1);
        assert_eq!(enrichment.resolved, 1);
        assert!(report.diagram.contains("b_Base <|-- a_Foo"));
        assert!(report.diagram.contains("a_Foo --> b_Base"));
    }

    #[tokio::test]
    async fn test_setup_py_classes_are_analyzed() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "setup.py", "class BuildExt(Base):\n    pass\n");
        write(dir.path(), "base.py", "class Base:\n    pass\n");

        let report = Pipeline::new(Config::default())
            .unwrap()
            .run(dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        let names: Vec<_> = report.analysis.classes.iter().map(|c| c.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["base.Base", "setup.BuildExt"]);
        assert!(report.graph.get("setup.BuildExt").unwrap().inherits.contains("base.Base"));
        assert!(report.analysis.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_acronym_class_used_in_body() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "db.py", "class DB:\n    pass\n");
        write(
            dir.path(),
            "app.py",
            "class App:\n    def start(self):\n        self.conn = DB()\n        return TIMEOUT\n",
        );

        let report = Pipeline::new(Config::default())
            .unwrap()
            .run(dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        let app = report.graph.get("app.App").unwrap();
        assert_eq!(app.uses.iter().collect::<Vec<_>>(), vec!["db.DB"]);
        assert!(report.diagram.contains("app_App --> db_DB"));
    }

    #[tokio::test]
    async fn test_java_project() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "src/com/example/Service.java",
            "package com.example;\n\npublic interface Service {\n    void start();\n}\n",
        );
        write(
            dir.path(),
            "src/com/example/UserService.java",
            "package com.example;\n\npublic class UserService implements Service {\n    private final UserRepository repository;\n\n    public void start() {}\n}\n",
        );
        write(
            dir.path(),
            "src/com/example/UserRepository.java",
            "package com.example;\n\npublic class UserRepository {}\n",
        );

        let report = Pipeline::new(Config::default())
            .unwrap()
            .run(dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        let service = report.graph.get("com.example.UserService").unwrap();
        assert!(service.inherits.contains("com.example.Service"));
        assert!(service.uses.contains("com.example.UserRepository"));
        assert_eq!(service.rank, 1);
    }
}

mod robustness {
    use super::*;

    #[tokio::test]
    async fn test_one_invalid_file_of_ten() {
        let dir = TempDir::new().unwrap();
        for i in 0..9 {
            write(dir.path(), &format!("m{}.py", i), &format!("class C{}:\n    pass\n", i));
        }
        write(dir.path(), "broken.py", "class Broken(:\n    def\n");

        let report = Pipeline::new(Config::default())
            .unwrap()
            .run(dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.analysis.classes.len(), 9);
        assert_eq!(report.analysis.diagnostics_of(DiagnosticKind::Parse).count(), 1);
        assert_eq!(report.analysis.diagnostics.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_cycle_terminates() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "pkg/models.py", "class User:\n    pass\n");
        std::os::unix::fs::symlink(dir.path(), dir.path().join("pkg/loop")).unwrap();

        let report = Pipeline::new(Config::default())
            .unwrap()
            .run(dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.analysis.diagnostics_of(DiagnosticKind::SymlinkCycle).count(), 1);
        assert_eq!(report.analysis.classes.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let result = Pipeline::new(Config::default())
            .unwrap()
            .run(&dir.path().join("missing"), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ArchError::InvalidRoot(_))));
    }
}

mod determinism {
    use super::*;

    fn sample_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "app/models.py",
            "from typing import List\n\nclass Base:\n    id: int\n\nclass User(Base):\n    name: str\n    orders: List[Order]\n\nclass Order(Base):\n    owner: 'User'\n",
        );
        write(
            dir.path(),
            "app/services.py",
            "class UserService:\n    def __init__(self, repo: UserRepository):\n        self.repo = repo\n\n    def find(self, user_id: int) -> User:\n        return self.repo.get(user_id)\n",
        );
        write(
            dir.path(),
            "app/repo.py",
            "class UserRepository:\n    def get(self, user_id):\n        return User()\n",
        );
        write(dir.path(), ".env.example", "DATABASE_URL=\n");
        dir
    }

    #[tokio::test]
    async fn test_repeated_runs_are_byte_identical() {
        let dir = sample_project();
        let pipeline = Pipeline::new(Config::default()).unwrap();
        let first = pipeline.run(dir.path(), &CancellationToken::new()).await.unwrap();
        let second = pipeline.run(dir.path(), &CancellationToken::new()).await.unwrap();

        assert_eq!(first.diagram, second.diagram);
        assert_eq!(first.export_json, second.export_json);
        assert_eq!(first.summary, second.summary);

        let out_a = TempDir::new().unwrap();
        let out_b = TempDir::new().unwrap();
        let written_a = first.write_to(out_a.path()).unwrap();
        let written_b = second.write_to(out_b.path()).unwrap();
        for (a, b) in written_a.iter().zip(&written_b) {
            assert_eq!(fs::read(a).unwrap(), fs::read(b).unwrap(), "{} differs", a.display());
        }
    }

    #[tokio::test]
    async fn test_cross_file_references_resolve() {
        let dir = sample_project();
        let report = Pipeline::new(Config::default())
            .unwrap()
            .run(dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        let user = report.graph.get("app.models.User").unwrap();
        assert!(user.inherits.contains("app.models.Base"));
        assert!(user.uses.contains("app.models.Order"));

        let service = report.graph.get("app.services.UserService").unwrap();
        assert!(service.uses.contains("app.repo.UserRepository"));
        assert!(service.uses.contains("app.models.User"));

        let context = report.analysis.tree.context_files();
        assert_eq!(context.len(), 1);
        assert!(context[0].ends_with(".env.example"));
    }

    #[test]
    fn test_ranking_breaks_ties_by_name() {
        let mut classes = Vec::new();
        for lib in ["L1", "L2", "L3", "L4", "L5"] {
            classes.push(ClassEntity::new(lib, format!("lib.{}", lib), "lib.py", "python", 1));
        }
        let user = |name: &str, used: &[&str]| {
            let mut class = ClassEntity::new(name, format!("m.{}", name), "m.py", "python", 1);
            for (i, ty) in used.iter().enumerate() {
                class.add_field(&format!("f{}", i), TypeRef::named(*ty), None);
            }
            class
        };
        classes.push(user("Beta", &["L1", "L2", "L3", "L4", "L5"]));
        classes.push(user("Alpha", &["L1", "L2", "L3", "L4", "L5"]));
        classes.push(user("Gamma", &["L1", "L2", "L3"]));

        let graph = RelationshipExtractor::new(&classes).build();
        assert_eq!(&graph.ranking()[..2], ["m.Alpha", "m.Beta"]);
        assert_eq!(graph.get("m.Alpha").unwrap().connections, 5);
        assert_eq!(graph.get("m.Beta").unwrap().rank, 2);
        assert_eq!(graph.get("m.Gamma").unwrap().connections, 3);
    }
}
