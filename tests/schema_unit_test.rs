//! Tests for the schema model and dependency graph.

use devdb::schema::{Edge, EntityId, EntitySchema, Field, Schema, SchemaGraph};

fn blog_schema() -> Schema {
    let mut schema = Schema::new();
    schema.add_entity(EntitySchema::new("auth_user", "id"));
    schema.add_entity(
        EntitySchema::new("app_post", "id").with_field(Field::reference("author_id", "auth_user")),
    );
    schema.add_entity(
        EntitySchema::new("app_comment", "id")
            .with_field(Field::reference("post_id", "app_post"))
            .with_field(Field::reference("author_id", "auth_user")),
    );
    schema
}

fn edges<'a>(iter: impl Iterator<Item = &'a Edge>) -> Vec<(u32, &'a str)> {
    iter.map(|e| (e.entity.0, e.field.as_str())).collect()
}

mod graph_tests {
    use super::*;

    #[test]
    fn test_reverse_and_forward_mappings() {
        let schema = blog_schema();
        let graph = SchemaGraph::from_schema(&schema);
        let user = schema.entity_id("auth_user").unwrap();
        let post = schema.entity_id("app_post").unwrap();
        let comment = schema.entity_id("app_comment").unwrap();

        assert_eq!(
            edges(graph.reverse(user)),
            vec![(post.0, "author_id"), (comment.0, "author_id")]
        );
        assert_eq!(edges(graph.reverse(post)), vec![(comment.0, "post_id")]);
        assert!(!graph.has_reverse(comment));

        assert_eq!(
            edges(graph.forward(comment)),
            vec![(user.0, "author_id"), (post.0, "post_id")]
        );
        assert_eq!(edges(graph.forward(post)), vec![(user.0, "author_id")]);
        assert!(!graph.has_forward(user));
    }

    #[test]
    fn test_forward_is_inverse_of_reverse() {
        let schema = blog_schema();
        let graph = SchemaGraph::from_schema(&schema);

        for entity in schema.iter() {
            for edge in graph.reverse(entity.id) {
                assert!(graph
                    .forward(edge.entity)
                    .any(|f| f.entity == entity.id && f.field == edge.field));
            }
            for edge in graph.forward(entity.id) {
                assert!(graph
                    .reverse(edge.entity)
                    .any(|r| r.entity == entity.id && r.field == edge.field));
            }
        }
    }

    #[test]
    fn test_roots_limit_inspected_entities() {
        let schema = blog_schema();
        let post = schema.entity_id("app_post").unwrap();
        let user = schema.entity_id("auth_user").unwrap();

        // From app_post only auth_user is reachable; app_comment is never
        // inspected, so its references are not part of the graph.
        let graph = SchemaGraph::build(&schema, &[post]);

        assert_eq!(edges(graph.reverse(user)), vec![(post.0, "author_id")]);
        assert!(!graph.has_reverse(post));
    }

    #[test]
    fn test_self_reference_terminates() {
        let mut schema = Schema::new();
        let category = schema.add_entity(
            EntitySchema::new("shop_category", "id")
                .with_field(Field::reference("parent_id", "shop_category")),
        );

        let graph = SchemaGraph::from_schema(&schema);

        assert!(graph.has_self_reference(category));
        assert_eq!(edges(graph.reverse(category)), vec![(category.0, "parent_id")]);
        assert_eq!(graph.reverse_closure(category), vec![category]);
        assert_eq!(graph.load_order(), vec![category]);
    }

    #[test]
    fn test_mutual_reference_terminates() {
        let mut schema = Schema::new();
        let a = schema.add_entity(
            EntitySchema::new("app_a", "id").with_field(Field::reference("b_id", "app_b")),
        );
        let b = schema.add_entity(
            EntitySchema::new("app_b", "id").with_field(Field::reference("a_id", "app_a")),
        );

        let graph = SchemaGraph::build(&schema, &[a]);

        assert_eq!(edges(graph.reverse(a)), vec![(b.0, "a_id")]);
        assert_eq!(edges(graph.reverse(b)), vec![(a.0, "b_id")]);

        let sorted = graph.topo_sort();
        assert!(sorted.order.is_empty());
        assert_eq!(sorted.cyclic, vec![a, b]);
        assert_eq!(graph.reverse_closure(a), vec![b, a]);
    }

    #[test]
    fn test_through_entity_edges_come_from_its_own_fields() {
        let mut schema = Schema::new();
        let person = schema.add_entity(EntitySchema::new("app_person", "id"));
        let group = schema.add_entity(
            EntitySchema::new("app_group", "id").with_field(Field::many_through(
                "members",
                "app_person",
                "app_membership",
            )),
        );
        let membership = schema.add_entity(
            EntitySchema::new("app_membership", "id")
                .with_field(Field::reference("person_id", "app_person"))
                .with_field(Field::reference("group_id", "app_group"))
                .with_field(Field::scalar("role")),
        );

        let graph = SchemaGraph::build(&schema, &[group]);

        assert_eq!(
            edges(graph.reverse(person)),
            vec![(membership.0, "person_id")]
        );
        assert_eq!(edges(graph.reverse(group)), vec![(membership.0, "group_id")]);
        assert!(!graph.has_forward(group));
        assert!(graph.forward(membership).all(|e| e.field != "members"));
    }

    #[test]
    fn test_implicit_many_reference_is_a_direct_edge() {
        let mut schema = Schema::new();
        let tag = schema.add_entity(EntitySchema::new("app_tag", "id"));
        let article = schema.add_entity(
            EntitySchema::new("app_article", "id").with_field(Field::many("tags", "app_tag")),
        );

        let graph = SchemaGraph::from_schema(&schema);

        assert_eq!(edges(graph.reverse(tag)), vec![(article.0, "tags")]);
        assert_eq!(edges(graph.forward(article)), vec![(tag.0, "tags")]);
    }

    #[test]
    fn test_unknown_targets_are_ignored() {
        let mut schema = Schema::new();
        let post = schema.add_entity(
            EntitySchema::new("app_post", "id")
                .with_field(Field::reference("site_id", "django_site")),
        );

        let graph = SchemaGraph::from_schema(&schema);

        assert!(!graph.has_forward(post));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_reverse_closure() {
        let schema = blog_schema();
        let graph = SchemaGraph::from_schema(&schema);
        let user = schema.entity_id("auth_user").unwrap();
        let post = schema.entity_id("app_post").unwrap();
        let comment = schema.entity_id("app_comment").unwrap();

        assert_eq!(graph.reverse_closure(user), vec![post, comment]);
        assert_eq!(graph.reverse_closure(post), vec![comment]);
        assert!(graph.reverse_closure(comment).is_empty());
    }

    #[test]
    fn test_load_order() {
        let mut schema = blog_schema();
        let category = schema.add_entity(
            EntitySchema::new("shop_category", "id")
                .with_field(Field::reference("parent_id", "shop_category")),
        );
        let a = schema.add_entity(
            EntitySchema::new("app_a", "id").with_field(Field::reference("b_id", "app_b")),
        );
        let b = schema.add_entity(
            EntitySchema::new("app_b", "id").with_field(Field::reference("a_id", "app_a")),
        );

        let graph = SchemaGraph::from_schema(&schema);
        let order = graph.load_order();
        let position = |id: EntityId| order.iter().position(|&o| o == id).unwrap();

        let user = schema.entity_id("auth_user").unwrap();
        let post = schema.entity_id("app_post").unwrap();
        let comment = schema.entity_id("app_comment").unwrap();
        assert!(position(user) < position(post));
        assert!(position(post) < position(comment));
        assert!(position(category) < position(a));
        assert_eq!(&order[order.len() - 2..], &[a, b]);
        assert_eq!(order.len(), 6);
    }
}

mod schema_tests {
    use super::*;

    #[test]
    fn test_entity_ids_follow_insertion() {
        let schema = blog_schema();
        let names: Vec<(u32, &str)> = schema.iter().map(|e| (e.id.0, e.name.as_str())).collect();
        assert_eq!(
            names,
            vec![(0, "auth_user"), (1, "app_post"), (2, "app_comment")]
        );
        assert_eq!(schema.name(EntityId(9)), "<unknown>");
    }

    #[test]
    fn test_reference_fields() {
        let schema = blog_schema();
        let comment = schema.get_entity("APP_COMMENT").unwrap();
        let refs: Vec<(&str, Option<&str>)> = comment
            .reference_fields()
            .map(|f| (f.name.as_str(), f.target()))
            .collect();
        assert_eq!(
            refs,
            vec![("post_id", Some("app_post")), ("author_id", Some("auth_user"))]
        );
        assert_eq!(comment.fields[0].name, "id");
    }
}
